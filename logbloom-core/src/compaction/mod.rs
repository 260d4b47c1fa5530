//! Compaction runs: plan bloom blocks for an ownership range and build them

mod store;

pub use store::{InMemoryMetaStore, Snapshot};

use crate::bloom::Meta;
use crate::config::PlannerConfig;
use crate::planner::{BlockPlan, GapWithBlocks, Planner};
use crate::{FingerprintBounds, Result, SegmentId};
use serde::Serialize;
use tracing::{info, warn};

/// Read access to segments and metas, plus publishing of new metas
pub trait MetaStore {
    /// Segments in scope for a tenant's ownership range
    fn segments(&self, tenant: &str, ownership: &FingerprintBounds) -> Result<Vec<SegmentId>>;

    /// Metas overlapping a tenant's ownership range
    fn metas(&self, tenant: &str, ownership: &FingerprintBounds) -> Result<Vec<Meta>>;

    /// Publish a newly built meta
    fn put_meta(&self, tenant: &str, meta: Meta) -> Result<()>;
}

/// Builds the blocks for one planned gap
///
/// Implementations copy the overlapping series out of the listed reusable
/// blocks, tokenize raw log lines for whatever those do not cover, store
/// the resulting blocks and return the meta describing them.
#[allow(async_fn_in_trait)]
pub trait BlockExecutor {
    async fn build(&self, tenant: &str, segment: &SegmentId, gap: &GapWithBlocks) -> Result<Meta>;
}

/// Outcome of a compaction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionSummary {
    /// Segments that needed work
    pub plans: usize,
    /// Gaps handed to the executor
    pub gaps: usize,
    /// Gaps built and published
    pub built: usize,
    /// Reusable block references across all gaps
    pub reused_blocks: usize,
    /// Gaps whose build failed
    pub failed: usize,
}

/// Drives planning and block building for ownership ranges
pub struct Controller<S, E> {
    store: S,
    executor: E,
    planner: Planner,
}

impl<S: MetaStore, E: BlockExecutor> Controller<S, E> {
    /// Create a new controller
    pub fn new(store: S, executor: E, config: PlannerConfig) -> Self {
        Self {
            store,
            executor,
            planner: Planner::new(config),
        }
    }

    /// The metadata store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The block executor
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Plan the builds needed for a tenant's ownership range
    pub fn plan(&self, tenant: &str, ownership: FingerprintBounds) -> Result<Vec<BlockPlan>> {
        let segments = self.store.segments(tenant, &ownership)?;
        let metas = self.store.metas(tenant, &ownership)?;
        self.planner.plan(ownership, &segments, &metas)
    }

    /// Plan and build every gap of a tenant's ownership range
    ///
    /// Planning errors abort the run. A failed build is logged and counted,
    /// and the run moves on to the next gap.
    pub async fn compact(
        &self,
        tenant: &str,
        ownership: FingerprintBounds,
    ) -> Result<CompactionSummary> {
        let plans = self.plan(tenant, ownership)?;
        info!(
            "Compacting {} for tenant {}: {} segments need blocks",
            ownership,
            tenant,
            plans.len()
        );

        let mut summary = CompactionSummary {
            plans: plans.len(),
            ..Default::default()
        };

        for plan in &plans {
            for gap in &plan.gaps {
                summary.gaps += 1;
                summary.reused_blocks += gap.blocks.len();

                match self.executor.build(tenant, &plan.segment, gap).await {
                    Ok(meta) => {
                        self.store.put_meta(tenant, meta)?;
                        summary.built += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to build blocks for {} gap {}: {}",
                            plan.segment, gap.bounds, e
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        info!(
            "Compacted {} for tenant {}: {} built, {} failed, {} blocks reused",
            ownership, tenant, summary.built, summary.failed, summary.reused_blocks
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::{BlockBuilder, BlockLocator, BloomFilter, BuiltBlock, SeriesBloomPopulator};
    use crate::config::{CompactorConfig, CoveragePolicy};
    use crate::{BloomError, ChunkRef, Fingerprint};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, HashMap};

    const TENANT: &str = "fake";
    const TABLE: &str = "index_19700";

    struct Series {
        fp: Fingerprint,
        chunk: ChunkRef,
        lines: Vec<&'static str>,
    }

    /// Builds blocks from in-memory log lines and keeps payloads in a map
    struct MemoryExecutor {
        populator: Mutex<SeriesBloomPopulator>,
        series: Vec<Series>,
        blocks: Mutex<HashMap<BlockLocator, Bytes>>,
        fail_segment: Option<SegmentId>,
    }

    impl MemoryExecutor {
        fn new(series: Vec<Series>) -> Self {
            let mut config = CompactorConfig::default();
            config.tokenizer.ngram_length = 3;
            config.bloom.expected_keys = 128;
            Self {
                populator: Mutex::new(SeriesBloomPopulator::from_config(&config).unwrap()),
                series,
                blocks: Mutex::new(HashMap::new()),
                fail_segment: None,
            }
        }

        fn store_block(&self, block: &BuiltBlock) -> crate::bloom::BlockRef {
            let block_ref = block.block_ref(TENANT, TABLE, 0, 0);
            self.blocks
                .lock()
                .insert(block_ref.locator.clone(), block.data.clone());
            block_ref
        }

        fn fetch(&self, locator: &BlockLocator) -> Result<BuiltBlock> {
            let data = self
                .blocks
                .lock()
                .get(locator)
                .cloned()
                .ok_or_else(|| BloomError::Storage(format!("block {locator} not found")))?;
            BuiltBlock::from_bytes(data, locator.checksum)
        }
    }

    impl BlockExecutor for MemoryExecutor {
        async fn build(
            &self,
            _tenant: &str,
            segment: &SegmentId,
            gap: &GapWithBlocks,
        ) -> Result<Meta> {
            if self.fail_segment.as_ref() == Some(segment) {
                return Err(BloomError::Storage("object store unavailable".into()));
            }

            let mut blooms: BTreeMap<Fingerprint, BloomFilter> = BTreeMap::new();
            for block in &gap.blocks {
                for (fp, bloom) in self.fetch(&block.locator)?.series_within(&gap.bounds)? {
                    match blooms.get_mut(&fp) {
                        Some(existing) => existing.union_with(&bloom)?,
                        None => {
                            blooms.insert(fp, bloom);
                        }
                    }
                }
            }

            let mut populator = self.populator.lock();
            for series in self.series.iter().filter(|s| gap.bounds.contains(s.fp)) {
                let fresh = populator.new_bloom();
                let bloom = blooms.entry(series.fp).or_insert(fresh);
                populator.populate(bloom, &series.chunk, series.lines.iter().copied());
            }

            let mut builder = BlockBuilder::new(gap.bounds);
            for (fp, bloom) in &blooms {
                builder.add_series(*fp, bloom)?;
            }
            let block_ref = self.store_block(&builder.finish());

            Ok(Meta::new(gap.bounds, vec![segment.clone()], vec![block_ref]))
        }
    }

    fn segment(n: i64) -> SegmentId {
        SegmentId::new(n, 0, 0, 0)
    }

    fn sample_series() -> Vec<Series> {
        vec![
            Series {
                fp: 2,
                chunk: ChunkRef::new(0, 10, 1),
                lines: vec!["level=info msg=started"],
            },
            Series {
                fp: 7,
                chunk: ChunkRef::new(0, 10, 2),
                lines: vec!["level=error msg=timeout", "retrying"],
            },
        ]
    }

    #[tokio::test]
    async fn test_compact_fills_every_gap() {
        let store = InMemoryMetaStore::new();
        store.add_segment(TENANT, segment(0));
        store.add_segment(TENANT, segment(1));
        store
            .put_meta(TENANT, Meta::new(FingerprintBounds::new(0, 4), vec![segment(0)], vec![]))
            .unwrap();
        store
            .put_meta(TENANT, Meta::new(FingerprintBounds::new(8, 10), vec![segment(1)], vec![]))
            .unwrap();

        let controller = Controller::new(
            store,
            MemoryExecutor::new(sample_series()),
            PlannerConfig::default(),
        );
        let ownership = FingerprintBounds::new(0, 10);

        let summary = controller.compact(TENANT, ownership).await.unwrap();
        assert_eq!(
            summary,
            CompactionSummary {
                plans: 2,
                gaps: 2,
                built: 2,
                reused_blocks: 0,
                failed: 0,
            }
        );
        assert_eq!(controller.store().meta_count(TENANT), 4);

        // a second run finds nothing left to do
        assert!(controller.plan(TENANT, ownership).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compact_reuses_blocks_from_other_segments() {
        let store = InMemoryMetaStore::new();
        store.add_segment(TENANT, segment(0));
        let controller = Controller::new(
            store,
            MemoryExecutor::new(sample_series()),
            PlannerConfig {
                coverage_policy: CoveragePolicy::WholeRange,
            },
        );
        let ownership = FingerprintBounds::new(0, 10);

        let first = controller.compact(TENANT, ownership).await.unwrap();
        assert_eq!(first.built, 1);
        assert_eq!(first.reused_blocks, 0);

        // a newer segment for the same range can start from segment 0's block
        controller.store().add_segment(TENANT, segment(1));
        let plans = controller.plan(TENANT, ownership).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].segment, segment(1));
        assert_eq!(plans[0].gaps[0].bounds, ownership);
        assert_eq!(plans[0].gaps[0].blocks.len(), 1);

        let second = controller.compact(TENANT, ownership).await.unwrap();
        assert_eq!(second.built, 1);
        assert_eq!(second.reused_blocks, 1);

        let metas = controller.store().metas(TENANT, &ownership).unwrap();
        let newest = metas.last().unwrap();
        assert_eq!(newest.sources, vec![segment(1)]);
        let block = controller.executor().fetch(&newest.blocks[0].locator).unwrap();
        let series = block.series().unwrap();
        assert_eq!(series.len(), 2);
        assert!(series[1].1.may_contain(b"tim"));
    }

    #[tokio::test]
    async fn test_compact_continues_after_failed_build() {
        let store = InMemoryMetaStore::new();
        store.add_segment(TENANT, segment(0));
        store.add_segment(TENANT, segment(1));
        store
            .put_meta(TENANT, Meta::new(FingerprintBounds::new(0, 4), vec![segment(0)], vec![]))
            .unwrap();
        store
            .put_meta(TENANT, Meta::new(FingerprintBounds::new(0, 4), vec![segment(1)], vec![]))
            .unwrap();

        let mut executor = MemoryExecutor::new(sample_series());
        executor.fail_segment = Some(segment(0));
        let controller = Controller::new(store, executor, PlannerConfig::default());

        let summary = controller
            .compact(TENANT, FingerprintBounds::new(0, 10))
            .await
            .unwrap();
        assert_eq!(summary.gaps, 2);
        assert_eq!(summary.built, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(controller.store().meta_count(TENANT), 3);
    }

    #[tokio::test]
    async fn test_compact_aborts_on_inconsistent_snapshot() {
        let store = InMemoryMetaStore::new();
        store.add_segment(TENANT, segment(0));

        let controller = Controller::new(
            store,
            MemoryExecutor::new(sample_series()),
            PlannerConfig::default(),
        );
        let err = controller
            .compact(TENANT, FingerprintBounds::new(0, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, BloomError::MissingCoverage(_)));
        assert!(!err.is_retryable());
    }
}
