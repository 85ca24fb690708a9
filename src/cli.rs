use clap::Parser;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_NUMBER"));

#[derive(Parser, Debug)]
#[command(name = "runfeed", version = VERSION, about = "Live pipeline run feed TUI")]
pub struct Cli {
    /// Bridge program that answers run queries and streams push events
    #[arg(long, default_value = "runfeed-bridge")]
    pub bridge: String,

    /// Only list runs of this pipeline (function path)
    #[arg(short, long)]
    pub function_path: Option<String>,

    /// Only list root runs (no parent)
    #[arg(long)]
    pub roots_only: bool,

    /// Open the run section for this run
    #[arg(long)]
    pub run: Option<String>,

    /// Runs per page
    #[arg(
        short,
        long,
        default_value_t = crate::model::DEFAULT_PAGE_LIMIT,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub limit: u32,

    /// Disable desktop notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Write debug logs to $XDG_STATE_HOME/runfeed/debug.log
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["runfeed"]).unwrap();
        assert_eq!(cli.bridge, "runfeed-bridge");
        assert_eq!(cli.limit, 10);
        assert!(!cli.roots_only);
        assert!(cli.run.is_none());
    }

    #[test]
    fn all_flags() {
        let cli = Cli::try_parse_from([
            "runfeed",
            "--bridge",
            "/opt/bridge",
            "-f",
            "pipelines.train",
            "--roots-only",
            "--run",
            "abc",
            "-l",
            "25",
            "--no-notify",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.bridge, "/opt/bridge");
        assert_eq!(cli.function_path.as_deref(), Some("pipelines.train"));
        assert!(cli.roots_only);
        assert_eq!(cli.run.as_deref(), Some("abc"));
        assert_eq!(cli.limit, 25);
        assert!(cli.no_notify);
        assert!(cli.verbose);
    }

    #[test]
    fn zero_limit_rejected() {
        assert!(Cli::try_parse_from(["runfeed", "--limit", "0"]).is_err());
    }
}
