pub mod identity;
pub mod profile;
pub mod role;

pub use identity::{kakao_uid, NewUser, UserRecord, UserUpdate, VerifiedToken, KAKAO_UID_PREFIX};
pub use profile::{AccountStatus, Profile, ProfileUpdate};
pub use role::{satisfies, Role};
