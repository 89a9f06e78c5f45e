pub mod account;
pub mod money;
pub mod raw;
pub mod transaction;

pub use account::{AccountList, CanonicalAccount, DEFAULT_CURRENCY};
pub use money::{decimal_from_value, parse_amount};
pub use raw::{records, CanonicalError, RawRecord, ACCOUNTS_KEY, TRANSACTIONS_KEY};
pub use transaction::{CanonicalTransaction, Paging, TransactionPage};
