//! Download queue state.
//!
//! A pure synchronous state machine: no I/O, no channels, no tracing. The
//! coordinator owns the instance and performs every side effect the state
//! transitions call for.
//!
//! Only the head of the queue downloads. The head owns the unit's
//! aggregate progress counters; they are born with the entry and die when
//! it is popped, which is what resets progress on dequeue.

use std::collections::{BTreeSet, VecDeque};

use mapdepot_core::{CountryId, MapOptions, Progress};

/// A map unit waiting in (or at the head of) the download queue.
#[derive(Clone, Debug)]
pub struct QueuedCountry {
    id: CountryId,
    options: MapOptions,
    current_file: Option<MapOptions>,
    progress: Progress,
}

impl QueuedCountry {
    fn new(id: CountryId, options: MapOptions) -> Self {
        Self {
            id,
            options,
            current_file: None,
            progress: Progress::default(),
        }
    }

    /// Unit id.
    #[must_use]
    pub fn id(&self) -> &CountryId {
        &self.id
    }

    /// The full requested option set.
    #[must_use]
    pub const fn options(&self) -> MapOptions {
        self.options
    }

    /// The option whose file is currently transferring, if any.
    #[must_use]
    pub const fn current_file(&self) -> Option<MapOptions> {
        self.current_file
    }

    /// Aggregate unit progress.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    fn union_options(&mut self, options: MapOptions) {
        self.options |= options;
    }
}

/// Result of an enqueue request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The unit was appended and is now the head of the queue.
    NewHead,
    /// The unit was appended behind the head.
    Appended,
    /// The unit was already queued; its options were unioned.
    Merged,
}

/// FIFO of pending units plus the failed set.
///
/// Invariant: a queued id is never in the failed set, and vice versa.
#[derive(Default)]
pub struct DownloadQueue {
    pending: VecDeque<QueuedCountry>,
    failed: BTreeSet<CountryId>,
}

impl DownloadQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The unit currently downloading.
    #[must_use]
    pub fn head(&self) -> Option<&QueuedCountry> {
        self.pending.front()
    }

    /// Whether `id` is the head.
    #[must_use]
    pub fn is_head(&self, id: &CountryId) -> bool {
        self.head().is_some_and(|head| head.id() == id)
    }

    /// Whether `id` is queued (head included).
    #[must_use]
    pub fn is_queued(&self, id: &CountryId) -> bool {
        self.pending.iter().any(|q| q.id() == id)
    }

    /// The queued entry of `id`.
    #[must_use]
    pub fn queued_country(&self, id: &CountryId) -> Option<&QueuedCountry> {
        self.pending.iter().find(|q| q.id() == id)
    }

    /// Queue a unit, or union options into its existing entry.
    ///
    /// Enqueueing clears the id from the failed set; the caller is
    /// expected to pass an already-normalized option set.
    pub fn enqueue(&mut self, id: CountryId, options: MapOptions) -> Enqueued {
        self.failed.remove(&id);
        if let Some(existing) = self.pending.iter_mut().find(|q| q.id() == &id) {
            existing.union_options(options);
            return Enqueued::Merged;
        }
        self.pending.push_back(QueuedCountry::new(id, options));
        if self.pending.len() == 1 {
            Enqueued::NewHead
        } else {
            Enqueued::Appended
        }
    }

    /// Remove `id` from the queue. Returns the removed entry.
    ///
    /// Removing the head does not start the next unit; the coordinator
    /// does that after aborting the active transfer.
    pub fn remove(&mut self, id: &CountryId) -> Option<QueuedCountry> {
        let at = self.pending.iter().position(|q| q.id() == id)?;
        self.pending.remove(at)
    }

    /// Pop the head after its download finished or was aborted.
    pub fn pop_head(&mut self) -> Option<QueuedCountry> {
        self.pending.pop_front()
    }

    /// Iterate queued units in order, head first.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedCountry> {
        self.pending.iter()
    }

    /// Record that the head is transferring the file of `option`.
    pub fn set_head_current_file(&mut self, option: MapOptions) {
        if let Some(head) = self.pending.front_mut() {
            head.current_file = Some(option);
        }
    }

    /// Update the head's aggregate progress.
    ///
    /// Progress is monotone within one download: a stale lower value is
    /// ignored.
    pub fn set_head_progress(&mut self, progress: Progress) {
        if let Some(head) = self.pending.front_mut() {
            if progress.done >= head.progress.done {
                head.progress = progress;
            }
        }
    }

    /// Move `id` into the failed set. The id must not be queued.
    pub fn mark_failed(&mut self, id: CountryId) {
        debug_assert!(!self.is_queued(&id));
        self.failed.insert(id);
    }

    /// Whether the last attempt for `id` failed.
    #[must_use]
    pub fn is_failed(&self, id: &CountryId) -> bool {
        self.failed.contains(id)
    }

    /// Forget a failure. Returns whether the id was in the failed set.
    pub fn clear_failed(&mut self, id: &CountryId) -> bool {
        self.failed.remove(id)
    }

    /// Iterate the failed set in id order.
    pub fn failed(&self) -> impl Iterator<Item = &CountryId> {
        self.failed.iter()
    }

    /// Drop everything: pending entries and the failed set.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CountryId {
        CountryId::from(s)
    }

    #[test]
    fn first_enqueue_becomes_head() {
        let mut queue = DownloadQueue::new();
        assert_eq!(queue.enqueue(id("A"), MapOptions::MAP), Enqueued::NewHead);
        assert_eq!(queue.enqueue(id("B"), MapOptions::MAP), Enqueued::Appended);
        assert!(queue.is_head(&id("A")));
        assert!(queue.is_queued(&id("B")));
        assert!(!queue.is_head(&id("B")));
    }

    #[test]
    fn enqueue_existing_unions_options() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);
        assert_eq!(
            queue.enqueue(id("A"), MapOptions::MAP | MapOptions::CAR_ROUTING),
            Enqueued::Merged
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.head().unwrap().options(),
            MapOptions::MAP | MapOptions::CAR_ROUTING
        );
    }

    #[test]
    fn enqueue_clears_failed_entry() {
        let mut queue = DownloadQueue::new();
        queue.mark_failed(id("A"));
        assert!(queue.is_failed(&id("A")));

        queue.enqueue(id("A"), MapOptions::MAP);
        assert!(!queue.is_failed(&id("A")));
        assert!(queue.is_queued(&id("A")));
    }

    #[test]
    fn pop_head_advances_fifo() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);
        queue.enqueue(id("B"), MapOptions::MAP);

        let popped = queue.pop_head().unwrap();
        assert_eq!(popped.id(), &id("A"));
        assert!(queue.is_head(&id("B")));
    }

    #[test]
    fn remove_non_head_keeps_head() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);
        queue.enqueue(id("B"), MapOptions::MAP);
        queue.enqueue(id("C"), MapOptions::MAP);

        assert!(queue.remove(&id("B")).is_some());
        assert!(queue.is_head(&id("A")));
        assert_eq!(queue.len(), 2);
        assert!(queue.remove(&id("B")).is_none());
    }

    #[test]
    fn head_progress_is_monotone() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);

        queue.set_head_progress(Progress::new(50, 100));
        assert_eq!(queue.head().unwrap().progress(), Progress::new(50, 100));

        // Stale tick arriving late is dropped.
        queue.set_head_progress(Progress::new(40, 100));
        assert_eq!(queue.head().unwrap().progress(), Progress::new(50, 100));

        queue.set_head_progress(Progress::new(80, 100));
        assert_eq!(queue.head().unwrap().progress().done, 80);
    }

    #[test]
    fn progress_resets_with_the_entry() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);
        queue.set_head_progress(Progress::new(50, 100));
        queue.pop_head();

        queue.enqueue(id("A"), MapOptions::MAP);
        assert_eq!(queue.head().unwrap().progress(), Progress::default());
    }

    #[test]
    fn queue_and_failed_set_stay_disjoint() {
        let mut queue = DownloadQueue::new();
        queue.enqueue(id("A"), MapOptions::MAP);
        queue.pop_head();
        queue.mark_failed(id("A"));

        queue.enqueue(id("A"), MapOptions::MAP);
        assert!(queue.is_queued(&id("A")));
        assert!(!queue.is_failed(&id("A")));
    }
}
