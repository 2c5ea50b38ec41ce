//! Single-producer/single-consumer hand-off between a capture thread and the
//! engine.
//!
//! The producer pushes whole frames; the consumer drains everything queued
//! at the start of its frame and keeps only the newest one, so stale poses
//! never pile up. Frames are never merged: a piece missing from the newest
//! frame is missing.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use super::raw::RawPose;

/// Why a batch could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// The queue is at capacity; the batch was not queued.
    Full,
    /// The consumer side was dropped.
    Disconnected,
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "observation queue is full"),
            Self::Disconnected => write!(f, "observation consumer disconnected"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Producer half of the observation queue.
#[derive(Debug)]
pub struct ObservationSender {
    tx: Sender<Vec<RawPose>>,
}

/// Consumer half of the observation queue.
#[derive(Debug)]
pub struct ObservationReceiver {
    rx: Receiver<Vec<RawPose>>,
}

/// Create a bounded queue holding up to `capacity` frames.
pub fn observation_channel(capacity: usize) -> (ObservationSender, ObservationReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (ObservationSender { tx }, ObservationReceiver { rx })
}

impl ObservationSender {
    /// Queue one frame without blocking.
    pub fn send(&self, batch: Vec<RawPose>) -> Result<(), FeedError> {
        self.tx.try_send(batch).map_err(|err| match err {
            TrySendError::Full(_) => FeedError::Full,
            TrySendError::Disconnected(_) => FeedError::Disconnected,
        })
    }
}

impl ObservationReceiver {
    /// Empty the queue and return the newest frame untouched. Older frames
    /// are discarded. Returns `None` when nothing was queued.
    pub fn drain(&self) -> Option<Vec<RawPose>> {
        let mut newest = None;
        let mut n_stale = 0usize;
        loop {
            match self.rx.try_recv() {
                Ok(batch) => {
                    if newest.replace(batch).is_some() {
                        n_stale += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if n_stale > 0 {
            tracing::debug!(n_stale, "skipped stale observation frames");
        }
        newest
    }

    /// Number of frames currently queued.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::normalize_frame;
    use crate::piece::PieceType;

    #[test]
    fn drain_keeps_only_the_newest_frame() {
        let (tx, rx) = observation_channel(4);
        tx.send(vec![
            RawPose::touch(1, PieceType::Square, [0.0, 0.0], 0.0, false, 0.0),
            RawPose::touch(2, PieceType::Parallelogram, [9.0, 0.0], 0.0, false, 0.0),
        ])
        .unwrap();
        tx.send(vec![RawPose::touch(
            1,
            PieceType::Square,
            [3.0, 0.0],
            0.0,
            false,
            0.1,
        )])
        .unwrap();
        assert_eq!(rx.pending(), 2);

        let frame = rx.drain().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].id, Some(1));
        assert_eq!(frame[0].position, Some([3.0, 0.0]));
        assert!(rx.drain().is_none());
    }

    #[test]
    fn drained_frame_resolves_duplicates_like_a_direct_frame() {
        let batch = vec![
            RawPose::touch(1, PieceType::Square, [5.0, 0.0], 0.0, false, 0.0).with_confidence(0.9),
            RawPose::touch(1, PieceType::Square, [9.0, 0.0], 0.0, false, 0.0).with_confidence(0.2),
        ];
        let (tx, rx) = observation_channel(2);
        tx.send(batch.clone()).unwrap();
        let drained = rx.drain().unwrap();
        assert_eq!(drained, batch);

        let direct = normalize_frame(&batch);
        let queued = normalize_frame(&drained);
        assert_eq!(queued.observations, direct.observations);
        assert_eq!(queued.observations[0].position, [5.0, 0.0]);
        assert_eq!(queued.n_duplicates, 1);
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let (tx, _rx) = observation_channel(1);
        tx.send(Vec::new()).unwrap();
        assert_eq!(tx.send(Vec::new()), Err(FeedError::Full));
    }

    #[test]
    fn producer_thread_hand_off() {
        let (tx, rx) = observation_channel(8);
        let handle = std::thread::spawn(move || {
            for i in 0..5 {
                let t = i as f64 * 0.1;
                tx.send(vec![RawPose::touch(
                    7,
                    PieceType::Square,
                    [i as f64, 0.0],
                    0.0,
                    false,
                    t,
                )])
                .unwrap();
            }
        });
        handle.join().unwrap();
        let frame = rx.drain().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].position, Some([4.0, 0.0]));
    }
}
