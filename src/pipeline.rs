use std::path::PathBuf;

use chrono::Utc;
use log::info;

use crate::fetch::Client;
use crate::normalize::{ListKind, ListStream, Normalizer};
use crate::output::{merge_prior, write_list, WriteError};
use crate::separate::separate;
use crate::source::Source;

/// One pipeline's wiring: which sources feed it, which kind of stream it
/// accumulates, and where the result lands.
pub struct Pipeline {
    pub kind: ListKind,
    pub title: String,
    pub sources: Vec<Source>,
    pub output: PathBuf,
}

pub struct RunSummary {
    pub blocklist_entries: usize,
    pub allowlist_entries: usize,
    pub failed_sources: Vec<Source>,
}

async fn run_pipeline(client: &Client, pipeline: &Pipeline) -> Result<ListStream, WriteError> {
    let (results, failed) = client
        .fetch_all(&pipeline.sources, |completed, total| {
            info!("[{}] fetched {completed}/{total} sources", pipeline.title);
        })
        .await;

    let mut normalizer = Normalizer::new(pipeline.kind);
    for result in &results {
        normalizer.ingest(result);
    }
    for source in failed {
        normalizer.mark_failed(source);
    }
    let mut stream = normalizer.finish();

    if pipeline.kind == ListKind::Block {
        merge_prior(&pipeline.output, &mut stream);
    }
    write_list(
        &pipeline.output,
        &pipeline.title,
        &stream,
        pipeline.sources.len(),
        Utc::now(),
    )?;
    Ok(stream)
}

/// Runs the blocklist and allowlist pipelines concurrently, then separates
/// the two streams and rewrites both files. A write failure is fatal only to
/// its own pipeline; the other file still gets written.
pub async fn run(
    client: &Client,
    blocklist: &Pipeline,
    allowlist: &Pipeline,
) -> Result<RunSummary, WriteError> {
    let (block_result, allow_result) = tokio::join!(
        run_pipeline(client, blocklist),
        run_pipeline(client, allowlist)
    );
    let (mut block_stream, mut allow_stream) = match (block_result, allow_result) {
        (Ok(block), Ok(allow)) => (block, allow),
        (Err(error), _) | (_, Err(error)) => return Err(error),
    };

    // The first write's header counts are stale once separation has run, so
    // both files are rewritten even when nothing moved.
    separate(&mut block_stream, &mut allow_stream);
    let block_write = write_list(
        &blocklist.output,
        &blocklist.title,
        &block_stream,
        blocklist.sources.len(),
        Utc::now(),
    );
    let allow_write = write_list(
        &allowlist.output,
        &allowlist.title,
        &allow_stream,
        allowlist.sources.len(),
        Utc::now(),
    );
    block_write?;
    allow_write?;

    let mut failed_sources = block_stream.failed;
    failed_sources.extend(allow_stream.failed);
    Ok(RunSummary {
        blocklist_entries: block_stream.domains.len() + block_stream.rules.len(),
        allowlist_entries: allow_stream.domains.len() + allow_stream.rules.len(),
        failed_sources,
    })
}
