//! # SkipList — lock-free concurrent ordered map
//!
//! A probabilistic skip list (max 20 levels, p = 0.5) supporting concurrent
//! insertion, lookup and in-order traversal without locks. Forward pointers
//! are atomic; every node carries an atomic `removed` flag used for *logical*
//! removal, since there is no physical erase.
//!
//! Replacement semantics: inserting an existing key marks the prior live node
//! removed (CAS on the flag) before linking the new node, so at any instant
//! at most one live node exists per key. Level 0 is the commit point: once
//! the level-0 CAS succeeds the insert is visible to every traversal
//! (release-store on link, acquire-load on walk). Upper-level links are
//! best-effort accelerators and retry on conflict.
//!
//! Nodes are retained until the list is dropped, so a reader holding a
//! reference obtained from `get` or an iterator never observes freed memory.
//! This deferred reclamation is acceptable because the map backs a memtable
//! that lives only until the next flush.

use rand::Rng;
use std::borrow::Borrow;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

const MAX_LEVEL: usize = 20;
const P: f64 = 0.5;

struct Node<K, V> {
    key: K,
    value: V,
    removed: AtomicBool,
    next: [AtomicPtr<Node<K, V>>; MAX_LEVEL],
}

impl<K, V> Node<K, V> {
    fn alloc(key: K, value: V) -> *mut Self {
        Box::into_raw(Box::new(Node {
            key,
            value,
            removed: AtomicBool::new(false),
            next: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
        }))
    }
}

fn random_level() -> usize {
    let mut rng = rand::thread_rng();
    let mut lvl = 1;
    while lvl < MAX_LEVEL && rng.gen::<f64>() < P {
        lvl += 1;
    }
    lvl
}

/// Concurrent sorted map from `K` to `V`.
///
/// `insert` takes `&self`; all mutation happens through atomics. The length
/// counter is eventually consistent with the number of live nodes.
pub struct SkipList<K, V> {
    head: [AtomicPtr<Node<K, V>>; MAX_LEVEL],
    len: AtomicUsize,
}

unsafe impl<K: Send, V: Send> Send for SkipList<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for SkipList<K, V> {}

impl<K: Ord, V> SkipList<K, V> {
    pub fn new() -> Self {
        Self {
            head: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of live keys. Eventually consistent between threads.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The forward slot of `node` at `level`; a null node stands for the head.
    fn next_slot(&self, node: *mut Node<K, V>, level: usize) -> &AtomicPtr<Node<K, V>> {
        if node.is_null() {
            &self.head[level]
        } else {
            unsafe { &(*node).next[level] }
        }
    }

    /// Fills `preds`/`succs` for `key` on levels `min_level..MAX_LEVEL`,
    /// walking while `next.key <= key` so that an existing node with the same
    /// key ends up as `preds[0]`.
    fn find_nodes(
        &self,
        key: &K,
        min_level: usize,
        start: *mut Node<K, V>,
        preds: &mut [*mut Node<K, V>; MAX_LEVEL],
        succs: &mut [*mut Node<K, V>; MAX_LEVEL],
    ) {
        let mut curr = start;
        for lvl in (min_level..MAX_LEVEL).rev() {
            let mut next = self.next_slot(curr, lvl).load(Ordering::Acquire);
            while !next.is_null() && unsafe { &(*next).key } <= key {
                curr = next;
                next = self.next_slot(curr, lvl).load(Ordering::Acquire);
            }
            preds[lvl] = curr;
            succs[lvl] = next;
        }
    }

    fn lower_bound_node<Q>(&self, key: &Q) -> *const Node<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut curr: *mut Node<K, V> = ptr::null_mut();
        for lvl in (0..MAX_LEVEL).rev() {
            let mut next = self.next_slot(curr, lvl).load(Ordering::Acquire);
            while !next.is_null() && unsafe { (*next).key.borrow() } < key {
                curr = next;
                next = self.next_slot(curr, lvl).load(Ordering::Acquire);
            }
        }
        let mut node = self.next_slot(curr, 0).load(Ordering::Acquire);
        while !node.is_null() && unsafe { (*node).removed.load(Ordering::Acquire) } {
            node = unsafe { (*node).next[0].load(Ordering::Acquire) };
        }
        node
    }

    /// Inserts `key` → `value`, replacing any prior live node for the key.
    ///
    /// Returns `true` if the key was not previously present (a genuinely new
    /// key), `false` if an existing node was logically replaced. Linearizable:
    /// once this call returns, `get(&key)` from any thread observes `value`.
    pub fn insert(&self, key: K, value: V) -> bool {
        let lvl = random_level();
        let node = Node::alloc(key, value);
        let mut preds = [ptr::null_mut(); MAX_LEVEL];
        let mut succs = [ptr::null_mut(); MAX_LEVEL];
        let mut replaced = false;
        let mut start: *mut Node<K, V> = ptr::null_mut();

        loop {
            let key_ref = unsafe { &(*node).key };
            self.find_nodes(key_ref, 0, start, &mut preds, &mut succs);
            start = preds[0];
            if !replaced && !preds[0].is_null() && unsafe { &(*preds[0]).key } == key_ref {
                let prior = unsafe { &*preds[0] };
                if prior
                    .removed
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_err()
                {
                    // a racing insert claimed the prior node; retry from it
                    continue;
                }
                replaced = true;
            }
            unsafe { (*node).next[0].store(succs[0], Ordering::Release) };
            if self
                .next_slot(preds[0], 0)
                .compare_exchange(succs[0], node, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        // Upper levels are best-effort: retry the link after re-resolving the
        // predecessors on conflict.
        for i in 1..lvl {
            loop {
                unsafe { (*node).next[i].store(succs[i], Ordering::Release) };
                if self
                    .next_slot(preds[i], i)
                    .compare_exchange(succs[i], node, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
                let key_ref = unsafe { &(*node).key };
                self.find_nodes(key_ref, i, start, &mut preds, &mut succs);
            }
        }

        if !replaced {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        !replaced
    }

    /// Returns the live value for `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.lower_bound_node(key);
        if node.is_null() {
            return None;
        }
        let node = unsafe { &*node };
        if node.key.borrow() == key {
            Some(&node.value)
        } else {
            None
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Iterator over live entries in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut node = self.head[0].load(Ordering::Acquire);
        while !node.is_null() && unsafe { (*node).removed.load(Ordering::Acquire) } {
            node = unsafe { (*node).next[0].load(Ordering::Acquire) };
        }
        Iter {
            node,
            _marker: PhantomData,
        }
    }

    /// Iterator starting at the first live entry with key ≥ `key`.
    pub fn range_from<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter {
            node: self.lower_bound_node(key),
            _marker: PhantomData,
        }
    }
}

impl<K: Ord, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for SkipList<K, V> {
    fn drop(&mut self) {
        // Every node, live or logically removed, stays linked at level 0.
        let mut curr = *self.head[0].get_mut();
        while !curr.is_null() {
            let next = unsafe { *(*curr).next[0].get_mut() };
            drop(unsafe { Box::from_raw(curr) });
            curr = next;
        }
    }
}

/// Forward iterator over live nodes. Does not hold any lock; entries inserted
/// or replaced concurrently may or may not be observed.
pub struct Iter<'a, K, V> {
    node: *const Node<K, V>,
    _marker: PhantomData<&'a SkipList<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node;
        if node.is_null() {
            return None;
        }
        let item = unsafe { (&(*node).key, &(*node).value) };
        let mut next = unsafe { (*node).next[0].load(Ordering::Acquire) };
        while !next.is_null() && unsafe { (*next).removed.load(Ordering::Acquire) } {
            next = unsafe { (*next).next[0].load(Ordering::Acquire) };
        }
        self.node = next;
        Some(item)
    }
}
