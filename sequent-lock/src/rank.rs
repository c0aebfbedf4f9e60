//! Ranking of lock requests.
//!
//! A request node is `<lock name><sequence>` where the sequence is a
//! `SEQUENCE_WIDTH`-digit zero-padded decimal assigned by the store. With a
//! fixed width, lexicographic order is creation order, so sorting names is
//! enough to recover the queue.

/// Width of the store-assigned sequence suffix
pub const SEQUENCE_WIDTH: usize = 10;

/// Position of a request in its lock's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rank {
    /// First in line: the lock is held
    Holder,
    /// Queued behind `predecessor`
    Waiter {
        position: usize,
        predecessor: String,
    },
}

impl Rank {
    /// Zero-based queue position
    pub fn position(&self) -> usize {
        match self {
            Rank::Holder => 0,
            Rank::Waiter { position, .. } => *position,
        }
    }
}

/// Whether `node` is a request for `lock_name`.
///
/// The suffix must be exactly `SEQUENCE_WIDTH` digits, so lock `res` never
/// picks up requests of lock `resource` and an unpadded suffix is never
/// compared as if it were padded.
pub fn is_request_of(node: &str, lock_name: &str) -> bool {
    node.strip_prefix(lock_name).is_some_and(|suffix| {
        suffix.len() == SEQUENCE_WIDTH && suffix.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Requests for `lock_name` among `children`, in queue order.
pub fn queue(children: Vec<String>, lock_name: &str) -> Vec<String> {
    let mut requests: Vec<String> = children
        .into_iter()
        .filter(|node| is_request_of(node, lock_name))
        .collect();
    requests.sort();
    requests
}

/// Rank of `own` among the requests for `lock_name`.
///
/// Returns `None` when `own` is not among them.
pub fn resolve(children: Vec<String>, lock_name: &str, own: &str) -> Option<Rank> {
    let requests = queue(children, lock_name);
    let position = requests.iter().position(|node| node == own)?;

    if position == 0 {
        Some(Rank::Holder)
    } else {
        Some(Rank::Waiter {
            position,
            predecessor: requests[position - 1].clone(),
        })
    }
}
