mod account;
mod audit;
mod daily_limit;
mod integrity;
mod money;
mod transaction;

pub use account::*;
pub use audit::*;
pub use daily_limit::*;
pub use integrity::*;
pub use money::*;
pub use transaction::*;
