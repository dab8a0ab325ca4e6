use std::env;
use std::io::Read;
use std::process::ExitCode;

use ladle::{ContextHint, RecipeParser};

const USAGE: &str = "\
Usage:
  ladle <url> [--attempts N]        parse a recipe page
  ladle --text [--hint H] [--source-url URL]
                                    parse recipe text from stdin
                                    (H: social_media | general)
  ladle --validate <url>            check a URL without fetching it
  ladle --domains                   list domains with dedicated rules
";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(args).await {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Vec<String>) -> Result<ExitCode, String> {
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        eprint!("{USAGE}");
        return Ok(ExitCode::from(2));
    }

    let parser = RecipeParser::from_env().map_err(|e| e.to_string())?;

    match args[0].as_str() {
        "--domains" => {
            println!("{}", pretty(&parser.supported_domains())?);
            Ok(ExitCode::SUCCESS)
        }
        "--validate" => {
            let url = args.get(1).ok_or("--validate needs a URL")?;
            let verdict = parser.validate_url(url);
            println!("{}", pretty(&verdict)?);
            Ok(if verdict.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        "--text" => {
            let hint = flag_value(&args, "--hint")
                .map(|raw| raw.parse::<ContextHint>())
                .transpose()
                .map_err(|e| e.to_string())?;
            let source_url = flag_value(&args, "--source-url");

            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("failed to read stdin: {e}"))?;

            let outcome = parser.parse_from_text(&text, hint, source_url).await;
            println!("{}", pretty(&outcome)?);
            Ok(if outcome.outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        url => {
            let attempts = flag_value(&args, "--attempts")
                .map(|raw| {
                    raw.parse::<u32>()
                        .map_err(|_| format!("--attempts needs a number, got \"{raw}\""))
                })
                .transpose()?;

            let outcome = parser.parse_from_url(url, attempts).await;
            parser.shutdown().await;
            println!("{}", pretty(&outcome)?);
            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}
