mod cli;

use clap::ArgMatches;
use ghutil::config::Config;
use ghutil::github::GithubClient;
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    cli::init_logging(log_level.as_deref());

    if matches.get_flag("version") {
        println!("ghutil {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let Some((name, sub)) = matches.subcommand() else {
        cli::build_cli().print_help()?;
        return Ok(());
    };

    let cfg = Config::from_env()?;
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; cancelling outstanding GitHub calls");
                cancel.cancel();
            }
        });
    }
    let client = GithubClient::new(cfg)?.with_cancellation(cancel);
    run(&client, name, sub).await
}

fn arg<'a>(m: &'a ArgMatches, name: &str) -> &'a str {
    m.get_one::<String>(name).map(String::as_str).unwrap_or_default()
}

fn number(m: &ArgMatches) -> u64 {
    m.get_one::<u64>("number").copied().unwrap_or_default()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(client: &GithubClient, name: &str, m: &ArgMatches) -> anyhow::Result<()> {
    match name {
        "user" => print_json(&client.get_user().await?),
        "repos" => print_json(&client.list_repos(arg(m, "org")).await?),
        "issues" => {
            let labels: Vec<String> = m
                .get_many::<String>("label")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            let issues = client
                .list_issues_by_repo(arg(m, "org"), arg(m, "repo"), &labels)
                .await?;
            info!("fetched {} issues", issues.len());
            print_json(&issues)
        }
        "comments" => print_json(
            &client
                .list_comments(arg(m, "org"), arg(m, "repo"), number(m))
                .await?,
        ),
        "create-issue" => print_json(
            &client
                .create_issue(arg(m, "org"), arg(m, "repo"), arg(m, "title"), arg(m, "body"))
                .await?,
        ),
        "close-issue" => {
            client
                .close_issue(arg(m, "org"), arg(m, "repo"), number(m))
                .await?;
            Ok(())
        }
        "reopen-issue" => {
            client
                .reopen_issue(arg(m, "org"), arg(m, "repo"), number(m))
                .await?;
            Ok(())
        }
        "comment" => print_json(
            &client
                .create_comment(arg(m, "org"), arg(m, "repo"), number(m), arg(m, "body"))
                .await?,
        ),
        other => anyhow::bail!("unknown command: {}", other),
    }
}
