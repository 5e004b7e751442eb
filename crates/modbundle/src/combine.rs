use std::path::PathBuf;

use crate::registry::DependencyTable;

pub trait Combine {
    /// Combine two values, preferring the values in `self`.
    ///
    /// Configuration layers are combined from the most specific (CLI-provided file)
    /// down to the least specific (system file), so `self` is always the layer
    /// with higher precedence.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

macro_rules! impl_combine_or {
    ($name:ty) => {
        impl Combine for Option<$name> {
            fn combine(self, other: Option<$name>) -> Option<$name> {
                self.or(other)
            }
        }
    };
}

impl_combine_or!(String);
impl_combine_or!(bool);
impl_combine_or!(u64);
impl_combine_or!(PathBuf);
// A dependency table is authoritative as a whole; layers never merge entries.
impl_combine_or!(DependencyTable);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_precedence_wins() {
        assert_eq!(Some(true).combine(Some(false)), Some(true));
        assert_eq!(None.combine(Some(false)), Some(false));
        assert_eq!(Some(3_u64).combine(None), Some(3));
        assert_eq!(None::<String>.combine(None), None);
    }

    #[test]
    fn test_tables_are_replaced_not_merged() {
        let high: DependencyTable = [("a".to_owned(), vec![])].into_iter().collect();
        let low: DependencyTable = [("b".to_owned(), vec![])].into_iter().collect();
        let combined = Some(high.clone()).combine(Some(low));
        assert_eq!(combined, Some(high));
    }
}
