use super::*;

#[test]
fn release_happens_exactly_once() {
    let mut arena = MediaArena::new();
    let h = arena.insert(vec![1u8, 2, 3], "video/webm");
    assert_eq!(arena.get(h).unwrap().bytes.as_ref(), &[1, 2, 3]);

    let released = arena.release(h).unwrap();
    assert_eq!(released.mime, "video/webm");
    assert!(arena.release(h).is_none());
    assert!(arena.get(h).is_none());

    let st = arena.stats();
    assert_eq!(st.live, 0);
    assert_eq!(st.live_bytes, 0);
    assert_eq!(st.released, 1);
}

#[test]
fn stale_handle_does_not_resolve_reused_slot() {
    let mut arena = MediaArena::new();
    let a = arena.insert(vec![1u8], "a");
    arena.release(a);
    let b = arena.insert(vec![2u8, 2], "b");

    assert_ne!(a, b);
    assert!(arena.get(a).is_none());
    assert!(arena.release(a).is_none());
    assert_eq!(arena.get(b).unwrap().bytes.len(), 2);
    assert_eq!(arena.stats().live, 1);
}

#[test]
fn stats_track_live_bytes() {
    let mut arena = MediaArena::new();
    let a = arena.insert(vec![0u8; 10], "a");
    let _b = arena.insert(vec![0u8; 5], "b");
    assert_eq!(arena.stats().live_bytes, 15);
    arena.release(a);
    assert_eq!(arena.stats().live_bytes, 5);
    assert_eq!(arena.stats().inserted, 2);
}
