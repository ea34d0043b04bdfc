use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vidscribe::video::VideoId;
use vidscribe::{Config, JsonVideoStore, TranscriptionPipeline, VideoStore};

fn cli() -> Command {
    Command::new("vidscribe")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Transcribe stored videos into speaker-tagged WebVTT subtitles")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to vidscribe.toml search paths)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run the transcription pipeline for one video")
                .arg(
                    Arg::new("video-id")
                        .long("video-id")
                        .value_name("ID")
                        .required(true),
                )
                .arg(
                    Arg::new("user-id")
                        .long("user-id")
                        .value_name("ID")
                        .help("Owner whose storage prefix holds the video")
                        .required(true),
                )
                .arg(
                    Arg::new("ai-generation")
                        .long("ai-generation")
                        .help("Trigger AI generation after a successful transcription")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show the transcription status of a video")
                .arg(
                    Arg::new("video-id")
                        .long("video-id")
                        .value_name("ID")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("set-disabled")
                .about("Enable or disable transcription for a video or an organization")
                .arg(Arg::new("video-id").long("video-id").value_name("ID"))
                .arg(Arg::new("org-id").long("org-id").value_name("ID"))
                .group(
                    ArgGroup::new("target")
                        .args(["video-id", "org-id"])
                        .required(true),
                )
                .arg(
                    Arg::new("value")
                        .long("value")
                        .value_parser(["true", "false", "unset"])
                        .required(true),
                ),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("--{} is required", name))
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::load()?.unwrap_or_else(|| {
            debug!("No configuration file found, using defaults");
            Config::default()
        }),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str, verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("vidscribe=debug,info"))
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    let config = load_config(&matches)?;
    init_logging(&config.logging.level, verbose);

    if verbose {
        info!("Verbose logging enabled");
        debug!("{}", config.summary());
    }

    let store = Arc::new(
        JsonVideoStore::open(config.store.state_dir.clone())
            .await
            .context("opening video store")?,
    );

    match matches.subcommand() {
        Some(("run", args)) => {
            let video_id = VideoId::new(required(args, "video-id")?);
            let user_id = required(args, "user-id")?;
            let ai_generation = args.get_flag("ai-generation");

            info!("🚀 vidscribe starting for video {}", video_id);
            let pipeline = TranscriptionPipeline::from_config(&config, store)?;
            let outcome = pipeline.run(&video_id, user_id, ai_generation).await;

            let drained = pipeline.drain_background().await;
            if drained > 0 {
                debug!("Waited for {} background task(s)", drained);
            }

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                return Err(anyhow!(outcome.message));
            }
        }
        Some(("status", args)) => {
            let video_id = VideoId::new(required(args, "video-id")?);
            let status = store.transcription_status(&video_id).await?;
            println!(
                "{}",
                serde_json::json!({ "videoId": video_id, "transcriptionStatus": status })
            );
        }
        Some(("set-disabled", args)) => {
            let value = match required(args, "value")? {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            };

            if let Some(video_id) = args.get_one::<String>("video-id") {
                store
                    .set_video_transcript_disabled(&VideoId::new(video_id.as_str()), value)
                    .await?;
                info!("⚙️  Video {} disable_transcript = {:?}", video_id, value);
            } else {
                let org_id = required(args, "org-id")?;
                store.set_organization_transcript_disabled(org_id, value).await?;
                info!("⚙️  Organization {} disable_transcript = {:?}", org_id, value);
            }
        }
        _ => {
            warn!("No subcommand given");
            cli().print_help()?;
        }
    }

    Ok(())
}
