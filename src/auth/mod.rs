//! Password hashing, bearer tokens and the routes and middleware built on them.

mod log_in;
mod middleware;
mod password;
mod register_user;
mod token;
mod user;

pub use log_in::{AccessTokenResponse, LogInForm, LogInState, TOKEN_TYPE, post_log_in};
pub use middleware::{AuthState, Rejection, auth_guard, authenticate};
pub use password::{PASSWORD_MIN_LENGTH, PasswordHash, ValidatedPassword};
pub use register_user::{
    RegisterForm, RegistrationState, ValidRegistration, register_user, validate_registration,
};
pub use token::{AuthError, DEFAULT_TOKEN_TTL, Identity, Token, TokenService};
pub use user::{
    NewUser, User, UserID, UserResponse, create_user, create_user_table, get_current_user,
    get_user_by_email,
};
