use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gvwatch::classify::with_behavior_bins;
use gvwatch::config::DashboardConfig;
use gvwatch::data::write_csv;
use gvwatch::logging::{log, obj, v_str, Domain, Level};
use gvwatch::refresh::{
    lock, refresh_cycle, run_periodic, shared, Applied, Pipeline, RefreshController,
};
use gvwatch::render::html::render_page;
use gvwatch::render::text::{render_summary, render_table};
use gvwatch::server::{serve, ServerContext};
use gvwatch::source::DefaultFetcher;

#[derive(Debug, Parser)]
#[command(name = "gvwatch", version)]
#[command(about = "Dashboard over the longitudinal run-history CSV")]
struct Cli {
    /// CSV location to try, in order (URL or path). Repeatable.
    #[arg(short = 'c', long = "candidate", global = true)]
    candidates: Vec<String>,

    /// Rows shown in the tail table
    #[arg(long, global = true)]
    tail: Option<usize>,

    /// Auto-refresh period in seconds
    #[arg(long, global = true)]
    refresh_secs: Option<u64>,

    /// Start with auto-refresh disabled
    #[arg(long, global = true)]
    no_auto: bool,

    /// Extra fetch attempts per candidate on transient errors
    #[arg(long, global = true)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the live dashboard with manual and periodic refresh
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
    /// Load once and write a static HTML page
    Render {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load once and print a terminal summary
    Status {
        /// Print the dashboard state as JSON instead
        #[arg(long)]
        json: bool,
        /// Also print the latest and tail tables
        #[arg(long)]
        tables: bool,
    },
    /// Write a copy of the history with a behavior_bin column
    Bin {
        #[arg(short, long)]
        out: PathBuf,
    },
}

impl Cli {
    fn apply(&self, cfg: &mut DashboardConfig) {
        if !self.candidates.is_empty() {
            cfg.candidates = self.candidates.clone();
        }
        if let Some(tail) = self.tail {
            cfg.tail_rows = tail;
        }
        if let Some(secs) = self.refresh_secs {
            cfg.refresh_secs = secs;
        }
        if self.no_auto {
            cfg.auto_refresh = false;
        }
        if let Some(retries) = self.retries {
            cfg.fetch_retries = retries;
        }
        match &self.command {
            Command::Serve { listen: Some(addr) } => cfg.listen = addr.clone(),
            Command::Render { out: Some(path) } => cfg.out_html = path.display().to_string(),
            _ => {}
        }
    }
}

fn build_pipeline(cfg: &DashboardConfig) -> Result<Pipeline> {
    Ok(Pipeline {
        fetcher: Arc::new(DefaultFetcher::new(cfg.fetch_timeout_secs)),
        candidates: cfg.sources()?,
        retry: cfg.retry(),
        tail_rows: cfg.tail_rows,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = DashboardConfig::from_env();
    cli.apply(&mut cfg);

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("config_hash", v_str(&cfg.config_hash())),
            ("candidates", json!(cfg.candidates)),
        ]),
    );

    let pipeline = Arc::new(build_pipeline(&cfg)?);
    let controller = shared(RefreshController::new(cfg.auto_refresh));

    match cli.command {
        Command::Serve { .. } => {
            // First paint comes from an immediate cycle; failures only set status.
            refresh_cycle(&controller, &pipeline).await;
            tokio::spawn(run_periodic(
                Arc::clone(&controller),
                Arc::clone(&pipeline),
                Duration::from_secs(cfg.refresh_secs.max(1)),
            ));
            let listener = tokio::net::TcpListener::bind(&cfg.listen)
                .await
                .with_context(|| format!("binding {}", cfg.listen))?;
            println!("Dashboard at http://{}", listener.local_addr()?);
            let ctx = Arc::new(ServerContext {
                controller,
                pipeline,
                refresh_secs: cfg.refresh_secs,
            });
            serve(listener, ctx).await
        }
        Command::Render { .. } => {
            let applied = refresh_cycle(&controller, &pipeline).await;
            let c = lock(&controller);
            if applied == Applied::Failed {
                bail!("{}", c.state().status_line);
            }
            let page = render_page(c.current_view(), &c.page_meta(cfg.refresh_secs, false));
            let out = PathBuf::from(&cfg.out_html);
            write_file(&out, &page)?;
            log(
                Level::Info,
                Domain::Render,
                "page_written",
                obj(&[
                    ("path", v_str(&out.display().to_string())),
                    ("bytes", json!(page.len())),
                ]),
            );
            println!("{} {}", "wrote".green(), out.display());
            println!("{}", c.state().status_line);
            Ok(())
        }
        Command::Status { json, tables } => {
            let applied = refresh_cycle(&controller, &pipeline).await;
            let c = lock(&controller);
            if json {
                println!("{}", serde_json::to_string_pretty(c.state())?);
            } else {
                match c.state().current.as_ref() {
                    Some(snap) => {
                        println!("{}", render_summary(&snap.view, &snap.source));
                        if tables {
                            println!("\n{}", "latest per scenario".bold());
                            println!("{}", render_table(&snap.view.latest));
                            let heading = format!("newest {} rows", snap.view.tail.rows.len());
                            println!("\n{}", heading.bold());
                            println!("{}", render_table(&snap.view.tail));
                        }
                    }
                    None => println!("{}", c.state().status_line.yellow()),
                }
            }
            if applied == Applied::Failed {
                bail!("{}", c.state().status_line);
            }
            Ok(())
        }
        Command::Bin { out } => {
            let applied = refresh_cycle(&controller, &pipeline).await;
            let c = lock(&controller);
            let snap = match (applied, c.state().current.as_ref()) {
                (Applied::Rendered, Some(snap)) => snap,
                _ => bail!("{}", c.state().status_line),
            };
            let binned = with_behavior_bins(&snap.dataset);
            write_file(&out, &write_csv(&binned.headers, &binned.rows))?;
            println!(
                "{} {} rows to {}",
                "binned".green(),
                binned.rows.len(),
                out.display()
            );
            Ok(())
        }
    }
}
