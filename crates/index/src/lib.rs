//! Strata Index - On-disk secondary indexes for Strata.
//!
//! This crate provides the disk-resident index engines:
//!
//! - `ByteTrie`: insert-only prefix trie mapping one key to one value
//! - `ByteMultiTrie`: trie of chain anchors plus a chain file, mapping a key to many values
//! - `IdIndex`: dense segmented array for auto-increment id columns
//! - `TableUniqueIndex` / `TableMultiIndex`: `Value`-keyed indexes driven through the `Index` trait
//!
//! Every engine stages mutations in memory until `commit` and discards them on `rollback`.
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_core::Config;
//! use strata_index::{LongIndex, LongMultiIndex};
//!
//! let config = Config::default();
//!
//! let mut ids = LongIndex::create("/tmp/strata/users.id", &config).unwrap();
//! ids.put(10, 4096).unwrap();
//! ids.commit().unwrap();
//! assert_eq!(ids.get(&10).unwrap(), Some(4096));
//!
//! let mut by_customer = LongMultiIndex::create("/tmp/strata/orders.customer", &config).unwrap();
//! by_customer.put(7, 100).unwrap();
//! by_customer.put(7, 200).unwrap();
//! by_customer.commit().unwrap();
//! assert_eq!(by_customer.get(&7).unwrap(), vec![100, 200]);
//! ```

pub mod bindings;
pub mod codec;
pub mod dense;
pub mod multi;
pub mod staged;
pub mod stats;
pub mod table;
pub mod traits;
pub mod trie;

pub use bindings::{
    DoubleIndex, DoubleMultiIndex, IdIndex, LongIndex, LongMultiIndex, MultiColumnIndex,
    MultiColumnMultiIndex, StringIndex, StringMultiIndex,
};
pub use codec::{DoubleKeyType, LongKeyType, LongLeafType, MultiKeyType, StringKeyType};
pub use multi::{ByteMultiTrie, MultiLeaf, MultiLeafType};
pub use staged::{RecordCodec, StagedFile};
pub use stats::{IndexStats, MultiIndexStats, StatsReport};
pub use table::{TableMultiIndex, TableUniqueIndex};
pub use traits::{Index, KeyType, LeafType};
pub use trie::ByteTrie;
