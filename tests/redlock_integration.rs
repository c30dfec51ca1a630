//! Integration tests exercising the quorum protocol end to end against real,
//! ephemeral Redis containers spun up per test via `testcontainers`. These
//! need a working Docker daemon.

use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use redlock::{Coordinator, Instance, LockOptions};
use testcontainers::clients::Cli;
use testcontainers::images::redis::Redis;
use testcontainers::{Container, RunnableImage};

type Containers = Vec<Container<'static, Redis>>;

static DOCKER: Lazy<Cli> = Lazy::new(Cli::docker);

fn start_servers(count: usize) -> (Containers, Vec<String>) {
    let containers: Containers = (0..count)
        .map(|_| DOCKER.run(RunnableImage::from(Redis::default()).with_tag("7-alpine")))
        .collect();

    let urls = containers
        .iter()
        .map(|node| format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379)))
        .collect();

    (containers, urls)
}

fn coordinator_for(urls: &[String]) -> Result<Coordinator> {
    let instances: Result<Vec<Instance>> = urls
        .iter()
        .map(|url| Instance::connect(url.as_str(), Duration::from_millis(200)).map_err(Into::into))
        .collect();
    Ok(Coordinator::new(instances?)?)
}

#[test]
fn s1_lock_all_servers_up_grants_with_valid_descriptor() -> Result<()> {
    let (_containers, urls) = start_servers(3);
    let coordinator = coordinator_for(&urls)?;

    let descriptor = coordinator.lock("r", Duration::from_millis(1000), LockOptions::new())?;
    assert!(descriptor.validity() > 0);
    assert!(descriptor.validity() <= 1000);
    Ok(())
}

#[test]
fn s2_second_coordinator_fails_while_first_holds_the_lock() -> Result<()> {
    let (_containers, urls) = start_servers(3);
    let first = coordinator_for(&urls)?;

    let _held = first.lock("r", Duration::from_millis(1000), LockOptions::new())?;

    let config = redlock::CoordinatorConfig::builder().retry_count(0).build();
    let instances: Result<Vec<Instance>> = urls
        .iter()
        .map(|url| Instance::connect(url.as_str(), Duration::from_millis(200)).map_err(Into::into))
        .collect();
    let second = Coordinator::with_config(instances?, config)?;

    let result = second.lock("r", Duration::from_millis(500), LockOptions::new());
    assert!(result.is_err());
    Ok(())
}

#[test]
fn s4_strict_scoped_lock_releases_on_normal_exit() -> Result<()> {
    let (_containers, urls) = start_servers(3);
    let coordinator = coordinator_for(&urls)?;

    let value = coordinator.locked_or_fail("r", Duration::from_millis(1000), LockOptions::new(), || 42)?;
    assert_eq!(value, 42);
    assert!(!coordinator.locked_q("r"));
    Ok(())
}

#[test]
fn s5_extend_only_if_locked_fails_once_lock_has_expired() -> Result<()> {
    let (_containers, urls) = start_servers(3);
    let coordinator = coordinator_for(&urls)?;

    let descriptor = coordinator.lock("r", Duration::from_millis(200), LockOptions::new())?;
    std::thread::sleep(Duration::from_millis(400));

    let result = coordinator.extend(&descriptor, Duration::from_millis(1000), true);
    assert!(result.is_err());
    assert!(!coordinator.locked_q("r"));
    Ok(())
}

#[test]
fn s6_remaining_ttl_for_lock_tracks_elapsed_time() -> Result<()> {
    let (_containers, urls) = start_servers(3);
    let coordinator = coordinator_for(&urls)?;

    let descriptor = coordinator.lock("r", Duration::from_millis(800), LockOptions::new())?;
    let remaining = coordinator.remaining_ttl_for_lock(&descriptor);
    assert!(remaining.is_some());
    let remaining = remaining.unwrap();
    assert!(remaining > 0 && remaining <= 800);
    Ok(())
}

#[test]
fn quorum_partial_failure_still_succeeds_with_two_of_five_down() -> Result<()> {
    let (_containers, mut urls) = start_servers(3);
    // Two more URLs pointing at nothing: `Instance::connect` never fails on
    // an unreachable server (only on a malformed URL), so these adapters
    // construct fine and simply contribute non-grants on every operation.
    urls.push("redis://127.0.0.1:1".to_string());
    urls.push("redis://127.0.0.1:2".to_string());

    let instances: Result<Vec<Instance>> = urls
        .iter()
        .map(|url| Instance::connect(url.as_str(), Duration::from_millis(200)).map_err(Into::into))
        .collect();
    let coordinator = Coordinator::new(instances?)?;

    let descriptor = coordinator.lock("r", Duration::from_millis(2000), LockOptions::new())?;
    assert!(descriptor.validity() > 0);
    Ok(())
}

#[test]
fn quorum_fails_with_three_of_five_down() -> Result<()> {
    let (_containers, mut urls) = start_servers(2);
    urls.push("redis://127.0.0.1:1".to_string());
    urls.push("redis://127.0.0.1:2".to_string());
    urls.push("redis://127.0.0.1:3".to_string());

    let instances: Result<Vec<Instance>> = urls
        .iter()
        .map(|url| Instance::connect(url.as_str(), Duration::from_millis(200)).map_err(Into::into))
        .collect();
    let config = redlock::CoordinatorConfig::builder().retry_count(1).build();
    let coordinator = Coordinator::with_config(instances?, config)?;

    let result = coordinator.lock("r", Duration::from_millis(1000), LockOptions::new());
    assert!(result.is_err());
    Ok(())
}
