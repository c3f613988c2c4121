// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! `sigaa` command-line client.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;

use sigaa_session::search::{Campus, SearchParams, SubjectResult};
use sigaa_session::{Institution, RequestOptions, SessionConfig, Sigaa};

#[derive(Parser)]
#[command(name = "sigaa", about = "Client for SIGAA academic portals", version)]
struct Cli {
    /// Portal base URL (overrides config and SIGAA_URL).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Institution variant (IFSC, UFPB, UNB, UFFS).
    #[arg(long, global = true)]
    institution: Option<Institution>,

    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the landing page.
    Login {
        /// Username (CPF or login).
        #[arg(short, long)]
        username: String,

        /// Password. Falls back to SIGAA_PASSWORD.
        #[arg(long)]
        password: Option<String>,
    },

    /// GET a path and print the decoded body.
    Fetch {
        /// Path relative to the portal, e.g. /sigaa/public/home.jsf
        path: String,

        /// Resume an existing session with this JSESSIONID.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Download a file to disk.
    Download {
        /// Path relative to the portal.
        path: String,

        /// Target file, or a directory to save into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Resume an existing session with this JSESSIONID.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// List campuses of the public class search.
    Campus,

    /// Search the public class schedule.
    Subjects {
        /// Campus value or part of its name. Defaults to every campus.
        #[arg(long)]
        campus: Option<String>,

        /// Academic year.
        #[arg(long)]
        year: Option<i32>,

        /// Academic period (1 or 2).
        #[arg(long)]
        period: Option<u8>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   sigaa completions bash > ~/.local/share/bash-completion/completions/sigaa
    ///   sigaa completions zsh > ~/.zfunc/_sigaa
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "sigaa_session=debug"
    } else {
        "sigaa_session=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().context("invalid log directive")?),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "sigaa", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = SessionConfig::resolve(cli.config.as_deref()).context("failed to load config")?;
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(institution) = cli.institution {
        config.institution = Some(institution);
    }
    let sigaa = Sigaa::new(config).context("failed to create session")?;

    let result = run(&cli, &sigaa).await;
    sigaa.close();
    result
}

async fn run(cli: &Cli, sigaa: &Sigaa) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p.clone(),
                None => std::env::var("SIGAA_PASSWORD")
                    .context("no --password given and SIGAA_PASSWORD is not set")?,
            };
            let page = sigaa
                .login(username, &password, None)
                .await
                .context("login failed")?;
            if cli.json {
                let out = json!({
                    "institution": sigaa.institution(),
                    "status": sigaa.session().login_status(),
                    "url": page.url().as_str(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Logged in to {}, landed on {}", sigaa.institution(), page.url());
            }
        }

        Commands::Fetch { path, session_id } => {
            if let Some(id) = session_id {
                sigaa.resume_session(id);
            }
            let page = sigaa
                .http()
                .get(path, RequestOptions::default())
                .await
                .with_context(|| format!("failed to fetch {path}"))?;
            let page = sigaa
                .http()
                .follow_all_redirect(page, RequestOptions::default())
                .await?;
            if cli.json {
                let out = json!({
                    "url": page.url().as_str(),
                    "status": page.status(),
                    "body": page.body_decoded(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", page.text());
            }
        }

        Commands::Download {
            path,
            output,
            session_id,
        } => {
            if let Some(id) = session_id {
                sigaa.resume_session(id);
            }
            let saved = sigaa
                .http()
                .download(path, output, None)
                .await
                .with_context(|| format!("failed to download {path}"))?;
            if cli.json {
                println!("{}", json!({ "path": saved.display().to_string() }));
            } else {
                println!("Saved {}", saved.display());
            }
        }

        Commands::Campus => {
            let campuses = sigaa.search().subject().campus_list().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&campuses)?);
            } else {
                for campus in &campuses {
                    println!("{:>8}  {}", campus.value, campus.name);
                }
            }
        }

        Commands::Subjects {
            campus,
            year,
            period,
        } => {
            let search = sigaa.search().subject();
            let campus = match campus {
                Some(wanted) => Some(pick_campus(search.campus_list().await?, wanted)?),
                None => None,
            };
            let params = SearchParams {
                campus,
                year: *year,
                period: *period,
            };
            let results = search.search(&params).await.context("search failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_subjects(&results);
            }
        }

        Commands::Completions { .. } => {}
    }
    Ok(())
}

fn pick_campus(campuses: Vec<Campus>, wanted: &str) -> anyhow::Result<Campus> {
    let needle = wanted.to_lowercase();
    let found = campuses
        .iter()
        .find(|c| c.value == wanted)
        .or_else(|| campuses.iter().find(|c| c.name.to_lowercase().contains(&needle)));
    match found {
        Some(campus) => Ok(campus.clone()),
        None => bail!("no campus matching {wanted:?}; run `sigaa campus` to list them"),
    }
}

fn print_subjects(results: &[SubjectResult]) {
    if results.is_empty() {
        println!("No classes found.");
        return;
    }
    for subject in results {
        println!("{} - {}", subject.id, subject.name);
        for team in &subject.teams {
            println!(
                "  [{}] {} | {} | {}",
                team.id,
                team.teacher,
                team.schedule.as_deref().unwrap_or("-"),
                team.location
            );
        }
    }
}
