//! Pose intake: raw records from touch or vision sources become normalized
//! per-frame observations.

mod feed;
mod normalize;
mod raw;

pub use feed::{observation_channel, FeedError, ObservationReceiver, ObservationSender};
pub use normalize::{normalize_frame, normalize_pose, NormalizeError, NormalizedFrame};
pub use raw::{PieceObservation, RawPose};
