//! Three-way override for optional, fork-gated fields.

/// What to do with an `Option` field of the object under customization.
///
/// Plain `Option<T>` patches cannot express "delete this field", which
/// version-mismatch tests rely on: sending a Shanghai payload without
/// withdrawals, or a Cancun forkchoice without a beacon root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldOverride<T> {
    /// Leave the field as built.
    #[default]
    Keep,
    /// Delete the field even if the fork requires it.
    Remove,
    /// Replace the field value, adding it if absent.
    Set(T),
}

impl<T: Clone> FieldOverride<T> {
    /// Applies the override to `target`.
    pub fn apply(&self, target: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Remove => *target = None,
            Self::Set(value) => *target = Some(value.clone()),
        }
    }

    /// Whether the override changes anything.
    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply() {
        let mut field = Some(1u64);
        FieldOverride::Keep.apply(&mut field);
        assert_eq!(field, Some(1));
        FieldOverride::Set(2u64).apply(&mut field);
        assert_eq!(field, Some(2));
        FieldOverride::<u64>::Remove.apply(&mut field);
        assert_eq!(field, None);
        FieldOverride::Set(3u64).apply(&mut field);
        assert_eq!(field, Some(3));
    }
}
