mod account;
mod admin;
mod auth;
mod internal;
pub mod sms;

use crate::subject::Role;

pub use account::{me, me_v2, weixin_jssdk, Me};
pub use admin::{ban_subject, get_subject, BanRequest, SubjectView};
pub use auth::{inspect_token, login_by_oauth, login_by_password, InspectResponse};
pub use internal::health;

/// Role a login request asks for when it names none.
fn default_role() -> Role {
    Role::AppUser
}
