mod common;

use std::sync::Arc;

use alloy::{
    primitives::{Address, U64, U256},
    rpc::types::Log,
};
use event_streams::{
    CheckpointStore, FilterState, PersistedFilter, StreamSpec, SubscriptionCheckpoint,
    SubscriptionInfo,
    checkpoint::{checkpoint_key, subscription_key},
};

use crate::common::{CollectingSink, STREAM_ID, count_increased_event, request, setup_engine};

fn persisted_info(id: &str, from_block: Option<&str>) -> SubscriptionInfo {
    let event = count_increased_event();
    SubscriptionInfo {
        id: id.into(),
        name: String::new(),
        summary: String::new(),
        stream: STREAM_ID.into(),
        filter: PersistedFilter {
            address: vec![Address::repeat_byte(0x11)],
            topics: vec![vec![event.selector()]],
        },
        event,
        from_block: from_block.map(Into::into),
    }
}

#[tokio::test]
async fn restore_resumes_from_checkpoint() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let setup = setup_engine(StreamSpec::new(STREAM_ID), Arc::clone(&sink)).await;

    let info = persisted_info("sub9", Some("100"));
    setup.store.put(&subscription_key("sub9"), &serde_json::to_vec(&info)?)?;
    setup.store.put(
        &checkpoint_key("sub9"),
        &serde_json::to_vec(&SubscriptionCheckpoint { hwm: 42 })?,
    )?;

    let restored = setup.manager.restore_all().await?;
    assert_eq!(restored, 1);

    // seeded from the checkpoint, not from the subscribe-time directive,
    // and left stale so the first poll cycle installs the filter
    let status = setup.manager.subscription_status("sub9").await?;
    assert_eq!(status.block_hwm, 42);
    assert_eq!(status.filter, FilterState::Stale);
    assert_eq!(
        status.name,
        format!("{}:CountIncreased(uint256)", Address::repeat_byte(0x11))
    );

    // first installation after restore uses exactly the checkpointed block
    setup.asserter.push_success(&U256::from(5)); // eth_newFilter
    setup.asserter.push_success(&Vec::<Log>::new()); // eth_getFilterLogs
    setup.manager.run_stream_cycle(STREAM_ID).await?;

    let status = setup.manager.subscription_status("sub9").await?;
    assert_eq!(status.filter, FilterState::Incremental { id: U256::from(5), from_block: 42 });

    Ok(())
}

#[tokio::test]
async fn restore_without_checkpoint_seeds_from_directive() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let setup = setup_engine(StreamSpec::new(STREAM_ID), Arc::clone(&sink)).await;

    let info = persisted_info("sub3", Some("77"));
    setup.store.put(&subscription_key("sub3"), &serde_json::to_vec(&info)?)?;

    assert_eq!(setup.manager.restore_all().await?, 1);
    assert_eq!(setup.manager.subscription_status("sub3").await?.block_hwm, 77);

    Ok(())
}

#[tokio::test]
async fn restore_skips_unreadable_records() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let setup = setup_engine(StreamSpec::new(STREAM_ID), Arc::clone(&sink)).await;

    setup.store.put(&subscription_key("bad"), b"not json")?;
    let info = persisted_info("good", Some("10"));
    setup.store.put(&subscription_key("good"), &serde_json::to_vec(&info)?)?;

    assert_eq!(setup.manager.restore_all().await?, 1);
    assert_eq!(setup.manager.subscription_ids().await, vec!["good".to_string()]);

    Ok(())
}

#[tokio::test]
async fn reset_discards_hwm_and_restarts_from_directive() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let setup = setup_engine(StreamSpec::new(STREAM_ID), Arc::clone(&sink)).await;
    let event = count_increased_event();

    setup.asserter.push_success(&U256::from(1)); // eth_newFilter
    setup.manager.subscribe(request("sub1", "100")).await?;

    setup.asserter.push_success(&vec![common::log_at_block(&event, 105)]); // eth_getFilterLogs
    setup.manager.run_stream_cycle(STREAM_ID).await?;
    assert_eq!(setup.manager.subscription_status("sub1").await?.block_hwm, 105);

    setup.manager.reset_subscription("sub1", Some("200".into())).await?;
    assert!(setup.manager.subscription_status("sub1").await?.reset_requested);

    // next cycle: unsubscribe (non-deleting), reinstall from the new
    // directive, then poll the fresh filter
    setup.asserter.push_success(&true); // eth_uninstallFilter
    setup.asserter.push_success(&U256::from(2)); // eth_newFilter
    setup.asserter.push_success(&Vec::<Log>::new()); // eth_getFilterLogs
    setup.manager.run_stream_cycle(STREAM_ID).await?;

    let status = setup.manager.subscription_status("sub1").await?;
    assert!(!status.reset_requested);
    assert_eq!(status.block_hwm, 200);
    assert_eq!(status.filter, FilterState::Incremental { id: U256::from(2), from_block: 200 });

    // the old checkpoint is gone until new progress is made
    assert_eq!(setup.store.get(&checkpoint_key("sub1"))?, None);

    // the replaced directive is what a later restore would see
    let stored: SubscriptionInfo =
        serde_json::from_slice(&setup.store.get(&subscription_key("sub1"))?.unwrap())?;
    assert_eq!(stored.from_block.as_deref(), Some("200"));

    Ok(())
}

#[tokio::test]
async fn reset_with_latest_directive_queries_head() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let setup = setup_engine(StreamSpec::new(STREAM_ID), Arc::clone(&sink)).await;

    setup.asserter.push_success(&U256::from(1)); // eth_newFilter
    setup.manager.subscribe(request("sub1", "100")).await?;

    setup.manager.reset_subscription("sub1", Some("latest".into())).await?;

    setup.asserter.push_success(&true); // eth_uninstallFilter
    setup.asserter.push_success(&U64::from(500)); // eth_blockNumber
    setup.asserter.push_success(&U256::from(2)); // eth_newFilter
    setup.asserter.push_success(&Vec::<Log>::new()); // eth_getFilterLogs
    setup.manager.run_stream_cycle(STREAM_ID).await?;

    let status = setup.manager.subscription_status("sub1").await?;
    assert_eq!(status.block_hwm, 500);
    assert_eq!(status.filter, FilterState::Incremental { id: U256::from(2), from_block: 500 });

    Ok(())
}
