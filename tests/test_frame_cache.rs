// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Frame lifetime across FrameCache, delivery tokens and subscribers.

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use framepipe::{FrameBuffer, FrameCache, FrameSet, SubscriberRegistry};

fn frames(n: u32) -> FrameSet {
    FrameSet::new(vec![FrameBuffer::from_vec(vec![n as u8; 12], 4, 3, n)]).unwrap()
}

#[test]
fn three_subscribers_share_one_entry() {
    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let a = subs.subscribe();
    let b = subs.subscribe();
    let c = subs.subscribe();

    let original = frames(1);
    let key = cache.insert(original.clone());
    assert_eq!(subs.notify(&cache, key), 3);
    assert_eq!(cache.pending(key), Some(3));
    assert!(!cache.check_and_remove_if_unreferenced(key));

    let got = a.try_recv().unwrap();
    assert!(got.ptr_eq(&original));
    assert_eq!(cache.pending(key), Some(2));
    b.try_recv().unwrap();
    assert_eq!(cache.pending(key), Some(1));
    c.try_recv().unwrap();
    assert_eq!(cache.pending(key), None);
    assert!(cache.is_empty());
}

#[test]
fn keys_are_reused_after_removal() {
    let cache = FrameCache::new();
    assert_eq!(cache.insert(frames(1)), 0);
    assert_eq!(cache.insert(frames(2)), 1);
    assert!(cache.check_and_remove_if_unreferenced(0));
    assert_eq!(cache.insert(frames(3)), 0);
    assert_eq!(cache.insert(frames(4)), 2);
    assert_eq!(cache.len(), 3);
}

#[test]
fn unsubscribed_frames_do_not_linger() {
    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let key = cache.insert(frames(1));
    assert_eq!(subs.notify(&cache, key), 0);
    assert!(cache.check_and_remove_if_unreferenced(key));
    assert!(cache.is_empty());
}

#[test]
fn consume_of_missing_key_is_none() {
    let cache = FrameCache::new();
    assert!(cache.consume(7).is_none());

    let key = cache.insert(frames(1));
    let _token = cache.reserve(key).unwrap();
    assert_eq!(cache.consume(key).unwrap().frame_number(), 1);
    assert!(cache.is_empty());
    assert!(cache.consume(key).is_none());
}

#[test]
fn dropped_tokens_release_their_share() {
    let cache = FrameCache::new();
    let key = cache.insert(frames(1));
    let t1 = cache.reserve(key).unwrap();
    let t2 = cache.reserve(key).unwrap();
    assert_eq!(t1.key(), key);
    assert_eq!(cache.pending(key), Some(2));
    drop(t1);
    assert_eq!(cache.pending(key), Some(1));
    drop(t2);
    assert!(cache.is_empty());
}

#[test]
fn dropped_subscription_releases_queued_frames() {
    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let keep = subs.subscribe();
    let gone = subs.subscribe();

    let k1 = cache.insert(frames(1));
    let k2 = cache.insert(frames(2));
    subs.notify(&cache, k1);
    subs.notify(&cache, k2);
    drop(gone);
    assert_eq!(cache.pending(k1), Some(1));
    assert_eq!(cache.pending(k2), Some(1));

    // The closed queue is pruned on the next notify.
    let k3 = cache.insert(frames(3));
    assert_eq!(subs.notify(&cache, k3), 1);
    assert_eq!(subs.len(), 1);
    assert_eq!(cache.pending(k3), Some(1));

    let order: Vec<u32> = (0..3).map(|_| keep.try_recv().unwrap().frame_number()).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert!(cache.is_empty());
}

#[test]
fn clear_discards_queued_deliveries() {
    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let sub = subs.subscribe();
    let key = cache.insert(frames(1));
    subs.notify(&cache, key);

    subs.clear();
    cache.clear();
    assert!(cache.is_empty());
    assert!(sub.try_recv().is_none());
    assert!(sub.recv().is_none());
}

#[test]
fn cross_thread_subscriber_gets_frames_in_order() {
    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let sub = subs.subscribe();

    let reader = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(f) = sub.recv_timeout(Duration::from_secs(5)) {
            seen.push(f.frame_number());
            if seen.len() == 20 {
                break;
            }
        }
        seen
    });

    for n in 0..20 {
        let key = cache.insert(frames(n));
        subs.notify(&cache, key);
        cache.check_and_remove_if_unreferenced(key);
    }
    let seen = reader.join().unwrap();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
    assert!(cache.is_empty());
}

#[test]
fn borrowed_planes_keep_master_alive() {
    let master = Bytes::from(vec![9u8; 24]);
    let y = FrameBuffer::from_bytes(master.slice(0..16), 4, 4, 3);
    let uv = FrameBuffer::from_bytes(master.slice(16..24), 4, 2, 3);
    drop(master);

    let cache = FrameCache::new();
    let subs = SubscriberRegistry::new();
    let sub = subs.subscribe();
    let key = cache.insert(FrameSet::new(vec![y, uv]).unwrap());
    subs.notify(&cache, key);
    cache.check_and_remove_if_unreferenced(key);

    let got = sub.recv().unwrap();
    assert_eq!(got.planes()[0].data(), &[9u8; 16][..]);
    assert_eq!(got.planes()[1].byte_len(), 8);
}
