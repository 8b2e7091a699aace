use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::TrackInfo,
};

/// A pending on-demand track.
///
/// `stream_url` is whatever the requester resolved at enqueue time; the
/// sequencer falls back to a fresh resolution from `info.source_path` when it
/// is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub info: TrackInfo,
    pub stream_url: Option<String>,
    pub requested_by: Option<UserId>,
    pub added_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(info: TrackInfo, stream_url: Option<String>, requested_by: Option<UserId>) -> Self {
        Self {
            info,
            stream_url,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }
}

/// FIFO of pending tracks for one guild. Only ever holds *pending* items; the
/// current track lives in the session's now-playing slot.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<QueuedTrack>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a track and returns the new queue length. Duplicates are allowed.
    pub fn enqueue(&mut self, track: QueuedTrack) -> PlaybackResult<usize> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ Added to queue: {}", track.title());
        self.items.push_back(track);
        Ok(self.items.len())
    }

    /// Puts a track at the head so it is the next one dequeued. Used by
    /// "play now" requests; capacity is not enforced for them.
    pub fn push_front(&mut self, track: QueuedTrack) {
        debug!("⏫ Queued at head: {}", track.title());
        self.items.push_front(track);
    }

    pub fn dequeue(&mut self) -> Option<QueuedTrack> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => info!("➡️ Next in queue: {}", item.title()),
            None => debug!("📭 Queue empty"),
        }
        next
    }

    pub fn peek(&self) -> Option<&QueuedTrack> {
        self.items.front()
    }

    /// Randomizes the pending items in place.
    pub fn shuffle(&mut self) -> PlaybackResult<()> {
        if self.items.len() < 2 {
            return Err(PlaybackError::NotEnoughToShuffle);
        }

        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 Queue shuffled ({} tracks)", self.items.len());
        Ok(())
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Queue cleared ({} tracks)", self.items.len());
        }
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<QueuedTrack> {
        self.items.iter().cloned().collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|item| item.info.duration).sum()
    }

    /// A 1-based page of the pending items; out-of-range pages are clamped.
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;

        QueuePage {
            items: self.items.iter().skip(start).take(per_page).cloned().collect(),
            offset: start,
            current_page,
            total_pages,
            total_items,
            total_duration: self.total_duration(),
        }
    }
}

/// One page of a queue listing.
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueuedTrack>,
    /// Zero-based position of the first item in the full queue.
    pub offset: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub total_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> QueuedTrack {
        QueuedTrack::new(TrackInfo::new(title, Some(format!("{}.mp3", title))), None, None)
    }

    fn titles(queue: &TrackQueue) -> Vec<String> {
        queue.to_vec().into_iter().map(|t| t.info.title).collect()
    }

    #[test]
    fn enqueue_is_fifo_and_reports_length() {
        let mut queue = TrackQueue::new(10);
        assert_eq!(queue.enqueue(track("a")).unwrap(), 1);
        assert_eq!(queue.enqueue(track("b")).unwrap(), 2);
        assert_eq!(queue.enqueue(track("a")).unwrap(), 3);

        assert_eq!(queue.dequeue().unwrap().info.title, "a");
        assert_eq!(queue.dequeue().unwrap().info.title, "b");
        assert_eq!(queue.dequeue().unwrap().info.title, "a");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn enqueue_rejects_when_full() {
        let mut queue = TrackQueue::new(1);
        queue.enqueue(track("a")).unwrap();
        assert_eq!(queue.enqueue(track("b")), Err(PlaybackError::QueueFull(1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let mut queue = TrackQueue::new(1);
        queue.enqueue(track("a")).unwrap();
        queue.push_front(track("now"));
        assert_eq!(queue.peek().map(QueuedTrack::title), Some("now"));
        assert_eq!(titles(&queue), vec!["now", "a"]);
    }

    #[test]
    fn shuffle_needs_two_items() {
        let mut queue = TrackQueue::new(10);
        assert_eq!(queue.shuffle(), Err(PlaybackError::NotEnoughToShuffle));
        queue.enqueue(track("a")).unwrap();
        assert_eq!(queue.shuffle(), Err(PlaybackError::NotEnoughToShuffle));
    }

    #[test]
    fn shuffle_keeps_the_same_items() {
        let mut queue = TrackQueue::new(100);
        for i in 0..20 {
            queue.enqueue(track(&format!("t{}", i))).unwrap();
        }
        queue.shuffle().unwrap();

        let mut after = titles(&queue);
        after.sort();
        let mut expected: Vec<String> = (0..20).map(|i| format!("t{}", i)).collect();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn pages_are_clamped() {
        let mut queue = TrackQueue::new(100);
        for i in 0..25 {
            queue.enqueue(track(&format!("t{}", i))).unwrap();
        }

        let page = queue.page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.offset, 20);
        assert_eq!(page.items[0].info.title, "t20");

        let page = queue.page(99, 10);
        assert_eq!(page.current_page, 3);

        let empty = TrackQueue::new(10).page(0, 10);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn page_totals_cover_the_whole_queue() {
        let mut queue = TrackQueue::new(10);
        queue
            .enqueue(QueuedTrack::new(
                TrackInfo::new("long", None).with_duration(Duration::from_secs(200)),
                None,
                None,
            ))
            .unwrap();
        queue.enqueue(track("unknown length")).unwrap();
        queue
            .enqueue(QueuedTrack::new(
                TrackInfo::new("short", None).with_duration(Duration::from_secs(40)),
                None,
                None,
            ))
            .unwrap();

        let page = queue.page(2, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_duration, Duration::from_secs(240));
    }
}
