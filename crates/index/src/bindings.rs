//! Concrete index types for each key domain.

use crate::codec::{DoubleKeyType, LongKeyType, LongLeafType, MultiKeyType, StringKeyType};
use crate::multi::ByteMultiTrie;
use crate::traits::KeyType;
use crate::trie::ByteTrie;
use std::path::Path;
use strata_core::{Config, DataType, Result};

pub use crate::dense::IdIndex;

pub type LongIndex = ByteTrie<LongKeyType, LongLeafType>;
pub type StringIndex = ByteTrie<StringKeyType, LongLeafType>;
pub type DoubleIndex = ByteTrie<DoubleKeyType, LongLeafType>;
pub type MultiColumnIndex = ByteTrie<MultiKeyType, LongLeafType>;

pub type LongMultiIndex = ByteMultiTrie<LongKeyType>;
pub type StringMultiIndex = ByteMultiTrie<StringKeyType>;
pub type DoubleMultiIndex = ByteMultiTrie<DoubleKeyType>;
pub type MultiColumnMultiIndex = ByteMultiTrie<MultiKeyType>;

impl<KT: KeyType + Default> ByteTrie<KT, LongLeafType> {
    /// Opens a unique index whose key type needs no parameters.
    pub fn create(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        ByteTrie::open(path, KT::default(), LongLeafType, config)
    }
}

impl<KT: KeyType + Default> ByteMultiTrie<KT> {
    /// Opens a multi-value index whose key type needs no parameters.
    pub fn create(base: impl AsRef<Path>, config: &Config) -> Result<Self> {
        ByteMultiTrie::open(base, KT::default(), config)
    }
}

impl MultiColumnIndex {
    pub fn with_columns(path: impl AsRef<Path>, types: Vec<DataType>, config: &Config) -> Result<Self> {
        ByteTrie::open(path, MultiKeyType::new(types), LongLeafType, config)
    }
}

impl MultiColumnMultiIndex {
    pub fn with_columns(base: impl AsRef<Path>, types: Vec<DataType>, config: &Config) -> Result<Self> {
        ByteMultiTrie::open(base, MultiKeyType::new(types), config)
    }
}
