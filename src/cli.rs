use clap::{value_parser, Arg, ArgAction, Command};

fn org_repo(cmd: Command) -> Command {
    cmd.arg(Arg::new("org").required(true).help("Owner or organization"))
        .arg(Arg::new("repo").required(true).help("Repository name"))
}

fn number(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("number")
            .required(true)
            .value_parser(value_parser!(u64))
            .help("Issue number"),
    )
}

pub fn build_cli() -> Command {
    Command::new("ghutil")
        .about("Rate-limit aware GitHub issue and comment tooling")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("user").about("Show the authenticated user"))
        .subcommand(
            Command::new("repos")
                .about("List repositories of an owner")
                .arg(Arg::new("org").required(true)),
        )
        .subcommand(
            org_repo(Command::new("issues").about("List all issues of a repository")).arg(
                Arg::new("label")
                    .long("label")
                    .action(ArgAction::Append)
                    .help("Only issues carrying this label (repeatable)"),
            ),
        )
        .subcommand(number(org_repo(
            Command::new("comments").about("List all comments of an issue"),
        )))
        .subcommand(
            org_repo(Command::new("create-issue").about("Open a new issue"))
                .arg(Arg::new("title").long("title").required(true))
                .arg(Arg::new("body").long("body").default_value("")),
        )
        .subcommand(number(org_repo(
            Command::new("close-issue").about("Close an issue"),
        )))
        .subcommand(number(org_repo(
            Command::new("reopen-issue").about("Reopen an issue"),
        )))
        .subcommand(
            number(org_repo(Command::new("comment").about("Comment on an issue")))
                .arg(Arg::new("body").long("body").required(true)),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, then RUST_LOG, then info.
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(lvl) = level {
        builder.parse_filters(lvl);
    }
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn issues_accepts_repeated_labels() {
        let m = build_cli()
            .try_get_matches_from(["ghutil", "issues", "o", "r", "--label", "a", "--label", "b"])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        let labels: Vec<&String> = sub.get_many::<String>("label").unwrap().collect();
        assert_eq!(labels, ["a", "b"]);
    }
}
