use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};
use math_to_tex::dom::{parse_html, serialize_body, serialize_document};
use math_to_tex::{default_rules, MathRewriter, Rule};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file.
    #[arg(long)]
    html_file: PathBuf,

    /// Output path. Writes to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Emit only the contents of <body>.
    #[arg(long)]
    body_only: bool,

    /// Rule to leave out (repeatable), e.g. `--skip-rule image`.
    #[arg(long = "skip-rule")]
    skip_rules: Vec<String>,

    /// Log each pass to stderr.
    #[arg(long)]
    verbose: bool,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|e| anyhow!("install logger: {e}"))?;
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
    Ok(())
}

fn select_rules(skip: &[String]) -> Result<Vec<Rule>> {
    let rules = default_rules();
    for name in skip {
        if !rules.iter().any(|r| r.name == name.as_str()) {
            let known: Vec<_> = rules.iter().map(|r| r.name).collect();
            return Err(anyhow!("unknown rule `{name}` (known: {})", known.join(", ")));
        }
    }
    Ok(rules
        .into_iter()
        .filter(|r| !skip.iter().any(|s| s.as_str() == r.name))
        .collect())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut html = String::new();
    File::open(&args.html_file)
        .with_context(|| format!("open {}", args.html_file.display()))?
        .read_to_string(&mut html)
        .context("read html")?;
    if html.trim().is_empty() {
        return Err(anyhow!("empty html"));
    }

    let rewriter = MathRewriter::with_rules(select_rules(&args.skip_rules)?);
    let dom = parse_html(&html);
    rewriter.rewrite(&dom);
    let out = if args.body_only {
        serialize_body(&dom)
    } else {
        serialize_document(&dom)
    };

    match &args.out {
        Some(path) => {
            File::create(path)
                .with_context(|| format!("create {}", path.display()))?
                .write_all(out.as_bytes())
                .context("write output")?;
            log::debug!("wrote {} bytes to {}", out.len(), path.display());
        }
        None => {
            std::io::stdout()
                .write_all(out.as_bytes())
                .context("write stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_named_rules() {
        let rules = select_rules(&["image".to_string(), "mathjax_tag".to_string()]).unwrap();
        assert_eq!(rules.len(), default_rules().len() - 2);
        assert!(rules.iter().all(|r| r.name != "image" && r.name != "mathjax_tag"));
    }

    #[test]
    fn rejects_unknown_rule_names() {
        let err = select_rules(&["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown rule `nope`"));
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "tex_from_html",
            "--html-file",
            "in.html",
            "--body-only",
            "--skip-rule",
            "image",
            "--skip-rule",
            "tex_error",
        ])
        .unwrap();
        assert!(args.body_only);
        assert!(args.out.is_none());
        assert_eq!(args.skip_rules, ["image", "tex_error"]);
    }
}
