mod automation;
mod load;
mod session;

pub use automation::WebDriverAutomation;
pub use load::{check_load, console_errors};
pub use session::{BrowserConfig, BrowserKind, new_session};
