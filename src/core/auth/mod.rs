pub mod identity;
pub mod manager;
pub mod profiles;
pub mod session;

pub use identity::{AuthResponse, IdentityService, YggdrasilClient, DEFAULT_AUTH_SERVER};
pub use manager::{AuthState, SessionManager};
pub use profiles::SessionSet;
pub use session::{Session, SessionState};
