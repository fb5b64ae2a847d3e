//! PKCE helper CLI
//!
//! Generates code verifiers and computes code challenges for exercising the
//! authorization and token endpoints by hand.
//!
//! ```bash
//! # Fresh verifier and its S256 challenge
//! oauth21-pkce generate
//!
//! # Challenge for an existing verifier
//! oauth21-pkce challenge --method S256 dBjftJeZ4CVP-mJ0kzyT3lu2OJ1yzhgOe0Q7-mjNlM
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use oauth21::oauth::{CodeChallengeMethod, PkceInfo, generate_token};
use serde_json::json;
use std::process;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "oauth21-pkce",
    about = "PKCE code verifier and challenge helper",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Print results as JSON
    #[arg(long, help = "Print results as a JSON object")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Generate a new code verifier and its S256 challenge
    Generate,
    /// Compute the challenge for a code verifier
    Challenge(ChallengeArgs),
}

#[derive(Args)]
struct ChallengeArgs {
    #[arg(long, value_enum, default_value = "S256", help = "Challenge transform")]
    method: Method,

    /// The code verifier
    verifier: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Plain,
    #[value(name = "S256", alias = "s256")]
    S256,
}

impl From<Method> for CodeChallengeMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Plain => CodeChallengeMethod::Plain,
            Method::S256 => CodeChallengeMethod::S256,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let (verifier, method) = match &cli.command {
        Commands::Generate => (generate_token(), CodeChallengeMethod::S256),
        Commands::Challenge(args) => (args.verifier.clone(), args.method.into()),
    };

    let length = verifier.chars().count();
    if !(PkceInfo::MIN_CHALLENGE_LENGTH..=PkceInfo::MAX_CHALLENGE_LENGTH).contains(&length) {
        eprintln!(
            "Error: verifier must be between {} and {} characters, got {length}",
            PkceInfo::MIN_CHALLENGE_LENGTH,
            PkceInfo::MAX_CHALLENGE_LENGTH
        );
        process::exit(2);
    }

    let challenge = method.calculate_challenge(&verifier);
    if cli.json {
        println!(
            "{}",
            json!({
                "code_verifier": verifier,
                "code_challenge": challenge,
                "code_challenge_method": method.as_str(),
            })
        );
    } else {
        println!("code_verifier={verifier}");
        println!("code_challenge={challenge}");
        println!("code_challenge_method={}", method.as_str());
    }
}
