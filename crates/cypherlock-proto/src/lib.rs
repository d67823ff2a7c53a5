//! Wire formats of the Cypherlock oracle protocol.
//!
//! Two families live here:
//!
//! - The **keylist**: the server-signed, hash-chained listing of
//!   pregenerated ratchet public keys that clients lock against
//!   ([`PregenerateEntry`], [`RatchetList`], [`MatchKey`]).
//! - The **message layers**: the nested envelope / ratchet / response
//!   triple the oracle exchange is built from, and the passphrase-sealed
//!   [`OracleMessage`] the client keeps on disk.
//!
//! Every layout is fixed-offset big-endian binary; compatibility is
//! bit-exact, so sizes and field orders in this crate are load-bearing.

mod envelope;
mod error;
mod keylist;
mod oracle;
mod ratchet_msg;
mod response;
mod secret_source;

pub use envelope::EnvelopeMessage;
pub use error::ProtoError;
pub use keylist::{
    covered_time_frame, MatchKey, PregenerateEntry, RatchetList, RatchetListBuilder,
    PREGEN_ENTRY_SIZE,
};
pub use oracle::{lock_filename, OracleMessage, OracleMessageTemplate};
pub use ratchet_msg::RatchetMessage;
pub use response::ResponseMessage;
pub use secret_source::SecretSource;
