// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Slot leasing through producer channels.

#![cfg(unix)]

use std::thread;

use framepipe::{ChannelConfig, ChannelSlotRegistry, Error, SharedChannel};
use tempfile::NamedTempFile;

fn key_sources(n: usize) -> (Vec<NamedTempFile>, ChannelConfig) {
    let files: Vec<_> = (0..n)
        .map(|_| NamedTempFile::new().expect("temp key source"))
        .collect();
    let paths: Vec<String> = files
        .iter()
        .map(|f| f.path().to_string_lossy().into_owned())
        .collect();
    for p in &paths {
        SharedChannel::clear_storage(p);
    }
    (files, ChannelConfig::default().with_key_sources(paths))
}

#[test]
fn producers_exhaust_and_reuse_slots() {
    let (_files, config) = key_sources(3);
    let registry = ChannelSlotRegistry::from_config(&config);
    assert_eq!(registry.capacity(), 3);

    let a = SharedChannel::create_producer(&registry, &config).unwrap();
    let b = SharedChannel::create_producer(&registry, &config).unwrap();
    let c = SharedChannel::create_producer(&registry, &config).unwrap();
    assert_eq!(a.id(), config.key_sources[0]);
    assert_eq!(b.id(), config.key_sources[1]);
    assert_eq!(c.id(), config.key_sources[2]);

    let err = SharedChannel::create_producer(&registry, &config).unwrap_err();
    assert!(matches!(err, Error::ResourceExhaustion(_)), "{err}");

    drop(b);
    assert_eq!(registry.in_use(), 2);
    let again = SharedChannel::create_producer(&registry, &config).unwrap();
    assert_eq!(again.id(), config.key_sources[1]);
}

#[test]
fn failed_creation_frees_the_slot() {
    let (_files, config) = key_sources(1);
    let registry = ChannelSlotRegistry::from_config(&config);
    let bad = config.clone().with_max_segment_size(0);
    assert!(matches!(
        SharedChannel::create_producer(&registry, &bad),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(registry.in_use(), 0);

    // Resources squatting on the key also release the lease.
    let leftover = SharedChannel::create_producer(&registry, &config).unwrap();
    std::mem::forget(leftover);
    let other = ChannelSlotRegistry::from_config(&config);
    assert!(SharedChannel::create_producer(&other, &config).is_err());
    assert_eq!(other.in_use(), 0);
    SharedChannel::clear_storage(&config.key_sources[0]);
}

#[test]
fn concurrent_allocation_hands_out_distinct_slots() {
    let registry = ChannelSlotRegistry::new((0..8).map(|i| format!("/slot/{i}")));
    let leases: Vec<_> = (0..8)
        .map(|_| {
            let r = registry.clone();
            thread::spawn(move || r.allocate().unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();
    let mut indices: Vec<usize> = leases.iter().map(|l| l.index()).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
    assert!(registry.allocate().is_err());
    drop(leases);
    assert_eq!(registry.in_use(), 0);
}
