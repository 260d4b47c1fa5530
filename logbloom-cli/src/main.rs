//! LogBloom CLI - plan bloom block builds and inspect tokenization

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logbloom_core::bloom::Meta;
use logbloom_core::compaction::{BlockExecutor, Controller, InMemoryMetaStore, Snapshot};
use logbloom_core::config::{CompactorConfig, DEFAULT_NGRAM_LENGTH, DEFAULT_NGRAM_SKIP};
use logbloom_core::planner::{BlockPlan, GapWithBlocks};
use logbloom_core::tokenizer::{NGramTokenizer, PrefixedTokenIter, TokenIter};
use logbloom_core::{BloomError, FingerprintBounds, SegmentId};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logbloom", version, about = "LogBloom - bloom block planning for log indexes")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the block plans for a metadata snapshot
    Plan {
        /// JSON snapshot of segments and metas
        #[arg(long)]
        snapshot: PathBuf,
        /// JSON compactor configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the snapshot's tenant
        #[arg(long)]
        tenant: Option<String>,
        /// Override the ownership range, as hex `min-max`
        #[arg(long, value_name = "HEX-HEX")]
        ownership: Option<FingerprintBounds>,
    },

    /// Print the n-grams of log lines, one per line
    Tokenize {
        #[arg(long, default_value_t = DEFAULT_NGRAM_LENGTH)]
        n: usize,
        #[arg(long, default_value_t = DEFAULT_NGRAM_SKIP)]
        skip: usize,
        /// Bytes prepended to every token
        #[arg(long)]
        prefix: Option<String>,
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.cmd {
        Cmd::Plan {
            snapshot,
            config,
            tenant,
            ownership,
        } => {
            let plans = plan(&snapshot, config.as_deref(), tenant, ownership)?;
            serde_json::to_writer_pretty(&mut out, &plans)?;
            writeln!(out)?;
        }
        Cmd::Tokenize {
            n,
            skip,
            prefix,
            lines,
        } => {
            for token in tokenize(n, skip, prefix.as_deref(), &lines)? {
                writeln!(out, "{}", token)?;
            }
        }
    }

    Ok(())
}

/// Plan builds for a snapshot, with optional tenant and range overrides
fn plan(
    snapshot: &Path,
    config: Option<&Path>,
    tenant: Option<String>,
    ownership: Option<FingerprintBounds>,
) -> Result<Vec<BlockPlan>> {
    let config = match config {
        Some(path) => CompactorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompactorConfig::default(),
    };
    let snapshot = Snapshot::load(snapshot)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;

    let tenant = tenant.unwrap_or_else(|| snapshot.tenant.clone());
    let ownership = ownership.unwrap_or(snapshot.ownership);
    info!(
        "Planning {} for tenant {} from {} segments and {} metas",
        ownership,
        tenant,
        snapshot.segments.len(),
        snapshot.metas.len()
    );

    let store = InMemoryMetaStore::from_snapshot(Snapshot {
        tenant: tenant.clone(),
        ..snapshot
    });
    let controller = Controller::new(store, NoExecutor, config.planner);
    let plans = controller.plan(&tenant, ownership)?;

    info!("{} segments need blocks", plans.len());
    Ok(plans)
}

/// Tokenize lines, rendering each token as lossy UTF-8
fn tokenize(n: usize, skip: usize, prefix: Option<&str>, lines: &[String]) -> Result<Vec<String>> {
    let mut tokenizer = NGramTokenizer::new(n, skip)?;
    let mut buf = prefix.map(|p| p.as_bytes().to_vec()).unwrap_or_default();
    let prefix_len = buf.len();
    let mut tokens = Vec::new();

    for line in lines {
        let mut iter = PrefixedTokenIter::new(&mut buf, prefix_len, tokenizer.tokens(line));
        while let Some(token) = iter.next_token() {
            tokens.push(String::from_utf8_lossy(token).into_owned());
        }
    }

    Ok(tokens)
}

/// Planning never builds, so no executor is needed
struct NoExecutor;

impl BlockExecutor for NoExecutor {
    async fn build(
        &self,
        _tenant: &str,
        segment: &SegmentId,
        _gap: &GapWithBlocks,
    ) -> logbloom_core::Result<Meta> {
        Err(BloomError::Storage(format!(
            "no block storage configured to build {}",
            segment
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "tenant": "fake",
        "ownership": {"min": 0, "max": 10},
        "segments": [
            {"ts": 0, "from": 0, "through": 0, "checksum": 0},
            {"ts": 1, "from": 0, "through": 0, "checksum": 0}
        ],
        "metas": [
            {
                "bounds": {"min": 0, "max": 5},
                "sources": [{"ts": 0, "from": 0, "through": 0, "checksum": 0}],
                "blocks": []
            },
            {
                "bounds": {"min": 6, "max": 10},
                "sources": [{"ts": 1, "from": 0, "through": 0, "checksum": 0}],
                "blocks": [{
                    "bounds": {"min": 6, "max": 10},
                    "locator": {"tenant": "fake", "table": "t", "start": 0, "end": 0, "checksum": 7}
                }]
            }
        ]
    }"#;

    fn snapshot_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_plan_snapshot() {
        let file = snapshot_file();

        let plans = plan(file.path(), None, None, None).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].gaps[0].bounds, FingerprintBounds::new(6, 10));
        assert_eq!(plans[0].gaps[0].blocks.len(), 1);
        assert_eq!(plans[1].gaps[0].bounds, FingerprintBounds::new(0, 5));
        assert!(plans[1].gaps[0].blocks.is_empty());
    }

    #[test]
    fn test_plan_overrides() {
        let file = snapshot_file();

        let plans = plan(file.path(), None, None, Some(FingerprintBounds::new(0, 7))).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].gaps[0].bounds, FingerprintBounds::new(6, 7));
        assert_eq!(plans[1].segment.ts, 1);

        // another tenant sees the same snapshot under its own name
        let plans = plan(file.path(), None, Some("other".into()), None).unwrap();
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn test_plan_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&dir.path().join("absent.json"), None, None, None).unwrap_err();
        assert!(err.to_string().contains("loading snapshot"));
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize(3, 0, None, &["abcd".to_string()]).unwrap();
        assert_eq!(tokens, vec!["abc", "bcd"]);

        let tokens = tokenize(2, 1, Some("p:"), &["abcd".to_string(), "xy".to_string()]).unwrap();
        assert_eq!(tokens, vec!["p:ab", "p:cd", "p:xy"]);

        assert!(tokenize(0, 0, None, &[]).is_err());
    }

    #[test]
    fn test_cli_parses_ownership() {
        let cli = Cli::try_parse_from([
            "logbloom",
            "plan",
            "--snapshot",
            "s.json",
            "--ownership",
            "0000000000000000-00000000000000ff",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Plan { ownership, .. } => {
                assert_eq!(ownership, Some(FingerprintBounds::new(0, 0xff)))
            }
            _ => panic!("expected plan command"),
        }
    }
}
