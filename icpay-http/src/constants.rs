//! Header names and defaults of the ICPay payment API.

/// Header carrying the account id alongside a secret key.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// Header carrying a publishable key.
pub const PUBLIC_KEY_HEADER: &str = "x-icpay-public-key";

/// Page size used by history commands when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
