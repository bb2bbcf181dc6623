use std::path::PathBuf;

use buffer_queue::QueueError;
use tokio_util::sync::CancellationToken;

use super::{Pipeline, first_failure};
use crate::config::EncoderConfig;
use crate::stage::muxer::MuxStats;

fn scratch(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mp4-encoder-pipeline-{}-{}",
        std::process::id(),
        name
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn input(name: &str, content: &[u8]) -> PathBuf {
    let path = scratch(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ------------------------------------------------------------------------
// Successful runs
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_pipeline_concatenates_inputs() -> anyhow::Result<()> {
    let first: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let second: Vec<u8> = (0..=255u8).rev().cycle().take(777).collect();
    let a = input("concat-a", &first);
    let b = input("concat-b", &second);
    let output = scratch("concat-out");

    let config = EncoderConfig::builder()
        .input_file(&a)
        .input_file(&b)
        .output_file(&output)
        .pool_size(2)
        .packet_size(64)
        .build()?;
    let report = Pipeline::new(config, CancellationToken::new()).run().await?;

    let written = std::fs::read(&output)?;
    assert_eq!(written, [first.as_slice(), second.as_slice()].concat());
    assert_eq!(report.bytes, 1777);
    assert_eq!(report.packets, 16 + 13);
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(report.inputs[0].path, a);
    assert_eq!(report.inputs[1].bytes, 777);

    for path in [a, b, output] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_pipeline_empty_input() -> anyhow::Result<()> {
    let a = input("empty-a", b"");
    let output = scratch("empty-out");

    let config = EncoderConfig::builder()
        .input_file(&a)
        .output_file(&output)
        .build()?;
    let report = Pipeline::new(config, CancellationToken::new()).run().await?;

    assert_eq!(report.packets, 0);
    assert_eq!(report.inputs.len(), 1);
    assert!(std::fs::read(&output)?.is_empty());

    for path in [a, output] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_pipeline_force_overwrites() -> anyhow::Result<()> {
    let a = input("force-a", b"fresh");
    let output = input("force-out", b"stale content");

    let config = EncoderConfig::builder()
        .input_file(&a)
        .output_file(&output)
        .force(true)
        .build()?;
    Pipeline::new(config, CancellationToken::new()).run().await?;

    assert_eq!(std::fs::read(&output)?, b"fresh");
    for path in [a, output] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

// ------------------------------------------------------------------------
// Failures
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_pipeline_refuses_existing_output() -> anyhow::Result<()> {
    let a = input("exists-a", b"data");
    let output = input("exists-out", b"keep me");

    let config = EncoderConfig::builder()
        .input_file(&a)
        .output_file(&output)
        .build()?;
    let err = Pipeline::new(config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("already exists"));
    assert_eq!(std::fs::read(&output)?, b"keep me");
    for path in [a, output] {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[tokio::test]
async fn test_pipeline_missing_input_removes_output() -> anyhow::Result<()> {
    let a = input("missing-a", b"first input is fine");
    let b = scratch("missing-b");
    let output = scratch("missing-out");

    let config = EncoderConfig::builder()
        .input_file(&a)
        .input_file(&b)
        .output_file(&output)
        .build()?;
    let err = Pipeline::new(config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("failed to open input"));
    assert!(!output.exists());
    std::fs::remove_file(a)?;
    Ok(())
}

#[tokio::test]
async fn test_pipeline_cancelled_before_start() -> anyhow::Result<()> {
    let a = input("cancel-a", &[1u8; 4096]);
    let output = scratch("cancel-out");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let config = EncoderConfig::builder()
        .input_file(&a)
        .output_file(&output)
        .pool_size(1)
        .packet_size(16)
        .build()?;
    let result = Pipeline::new(config, cancel).run().await;

    assert!(result.is_err());
    assert!(!output.exists());
    std::fs::remove_file(a)?;
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_pipeline_reports_muxer_write_error() -> anyhow::Result<()> {
    let a = input("full-a", &vec![3u8; 4 * 1024 * 1024]);

    let config = EncoderConfig::builder()
        .input_file(&a)
        .output_file("/dev/full")
        .force(true)
        .pool_size(1)
        .packet_size(64)
        .build()?;
    let err = Pipeline::new(config, CancellationToken::new())
        .run()
        .await
        .unwrap_err();
    std::fs::remove_file(a)?;

    let message = format!("{:#}", err);
    assert!(!message.contains("cancelled"), "{}", message);
    assert!(
        err.chain().any(|cause| cause.downcast_ref::<std::io::Error>().is_some()),
        "{}",
        message
    );
    Ok(())
}

// ------------------------------------------------------------------------
// Failure attribution
// ------------------------------------------------------------------------

fn cancelled_demuxer() -> anyhow::Result<()> {
    Err(anyhow::Error::from(QueueError::Cancelled).context("input a.dv"))
}

#[test]
fn test_first_failure_prefers_muxer_when_it_cancelled() {
    let err = first_failure(
        cancelled_demuxer(),
        Err(anyhow::anyhow!("disk full")),
        true,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "disk full");
}

#[test]
fn test_first_failure_prefers_demuxer_otherwise() {
    let err = first_failure(
        Err(anyhow::anyhow!("failed to read a.dv")),
        Err(QueueError::Cancelled.into()),
        false,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "failed to read a.dv");

    // an outside cancellation stops both stages; neither is the cause
    let err = first_failure(cancelled_demuxer(), Err(QueueError::Cancelled.into()), false)
        .unwrap_err();
    assert_eq!(err.to_string(), "input a.dv");
}

#[test]
fn test_first_failure_passes_muxer_result() -> anyhow::Result<()> {
    let stats = first_failure(Ok(()), Ok(MuxStats::default()), false)?;
    assert_eq!(stats.packets, 0);
    Ok(())
}
