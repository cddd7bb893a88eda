use genai_client::audio::PlaybackState;
use genai_client::models::ImageQuality;
use genai_client::services::metrics;
use genai_client::{GenaiConfig, Outcome, Studio};
use studio_core::error::AppError;
use studio_core::observability::init_tracing;
use tokio::signal;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: genai-studio <command> [args]

commands:
  set-key <key>          store the API key
  clear-key              forget the stored API key
  usage                  show today's credit usage
  sign-in <email> <name> remember who is using the studio
  sign-out               forget the signed-in account
  language <en|zo|my>    set the interface language
  chat <message>         conversational reply
  define <word>          dictionary entry
  translate <from> <to> <text>
  search <query>         web-grounded answer
  places <query>         maps-grounded answer
  image <prompt>         generate an image (prints a data URL)
  speak <text>           synthesize and play speech
  video <prompt>         generate a video (Ctrl+C abandons the job)
  metrics                print collected metrics";

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        tracing::info!("Interrupt received");
        token.cancel();
    }
}

fn report<T>(outcome: Outcome<T>, render: impl FnOnce(T) -> String) {
    match outcome {
        Outcome::Completed(value) => println!("{}", render(value)),
        Outcome::QuotaExceeded { limit } => println!(
            "You have used all {} free credits for today. Upgrade for unlimited access.",
            limit
        ),
    }
}

fn render_sources(answer: genai_client::models::GroundedAnswer) -> String {
    let mut out = answer.text;
    for source in answer.sources {
        out.push_str(&format!("\n  - {} <{}>", source.title, source.uri));
    }
    out
}

async fn run(studio: &Studio, args: &[String]) -> Result<(), AppError> {
    let command = args.first().map(String::as_str).unwrap_or("");
    let rest = args.get(1..).unwrap_or_default().join(" ");

    match command {
        "set-key" => {
            studio.set_credential(&rest)?;
            println!("API key saved.");
        }
        "clear-key" => {
            studio.clear_credential()?;
            println!("API key cleared.");
        }
        "usage" => {
            let usage = studio.usage()?;
            match studio.remaining_credits()? {
                Some(left) => println!(
                    "{} used today, {} remaining",
                    usage.credits_used_today, left
                ),
                None => println!("Unlimited (subscribed)"),
            }
        }
        "sign-in" => {
            let (email, name) = match args.get(1) {
                Some(email) => (email.as_str(), args.get(2..).unwrap_or_default().join(" ")),
                None => return Err(AppError::InvalidRequest(USAGE.to_string())),
            };
            let record = studio.sign_in(email, &name)?;
            println!(
                "Signed in as {}",
                record.tier.display_name.unwrap_or_default()
            );
        }
        "sign-out" => {
            studio.sign_out()?;
            println!("Signed out.");
        }
        "language" => {
            let record = studio.set_language(rest.parse()?)?;
            println!("Language set to {}", record.language);
        }
        "chat" => report(studio.chat(&rest, None, None).await?, |text| text),
        "define" => report(studio.lookup_word(&rest).await?, |text| text),
        "translate" => {
            let (from, to) = match (args.get(1), args.get(2)) {
                (Some(from), Some(to)) => (from.as_str(), to.as_str()),
                _ => return Err(AppError::InvalidRequest(USAGE.to_string())),
            };
            let text = args.get(3..).unwrap_or_default().join(" ");
            report(studio.translate(&text, from, to).await?, |text| text);
        }
        "search" => report(studio.search(&rest).await?, render_sources),
        "places" => report(studio.find_places(&rest, None).await?, render_sources),
        "image" => report(
            studio.generate_image(&rest, ImageQuality::Standard).await?,
            |image| image.data_url(),
        ),
        "speak" => {
            let mut states = studio.subscribe_playback();
            let outcome = studio.speak(&rest, None).await?;
            let started = outcome.is_completed();
            report(outcome, |id| format!("Playing session {}", id));
            if started {
                while *states.borrow_and_update() != PlaybackState::Idle {
                    if states.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
        "video" => {
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
            let outcome = studio
                .generate_video_with_cancel(&rest, &cancel, |status| eprintln!("{}", status))
                .await?;
            report(outcome, |uri| uri);
        }
        "metrics" => print!("{}", metrics::get_metrics()),
        _ => println!("{}", USAGE),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = GenaiConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing("genai-studio", &config.common.log_level)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics unavailable");
    }

    let studio = Studio::from_config(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&studio, &args).await {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}
