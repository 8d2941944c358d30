//! Protocol constants. All monetary values in grains (1 ARB = 10^8 grains).

/// Number of grains in one ARB.
pub const COIN: u64 = 100_000_000;

/// Maximum depth, in blocks, that a submitted block's parent may lag behind
/// the best height.
///
/// A block whose height would be `<= best_height - CUTOFF_AGE` is refused,
/// and height levels at or below `best_height - CUTOFF_AGE - 1` are evicted.
///
/// # Examples
///
/// ```
/// use arbor_core::constants::CUTOFF_AGE;
/// assert_eq!(CUTOFF_AGE, 10);
/// ```
pub const CUTOFF_AGE: u64 = 10;

/// Current block and transaction format version.
pub const PROTOCOL_VERSION: u64 = 1;

/// Maximum number of inputs accepted in a single transaction.
pub const MAX_TX_INPUTS: usize = 1_000;

/// Maximum number of outputs accepted in a single transaction.
pub const MAX_TX_OUTPUTS: usize = 1_000;
