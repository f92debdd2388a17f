pub mod errors;
pub mod ids;
pub mod pose;
pub mod protocol;
pub mod suggest;

pub use errors::{RelayError, SuggestError};
pub use ids::ConnectionId;
pub use pose::{Pose, PoseUpdate, Quat, Vec3};
pub use suggest::UrlSuggester;
