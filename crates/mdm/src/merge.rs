//! First-non-null-wins projection merge.
//!
//! The projection starts from the master's own (empty) content, optionally
//! seeded with a full copy of the record of truth, then each contributing
//! member backfills attributes in link order. A value set by an earlier
//! member is never overwritten.

use medley_core::RecordView;
use serde_json::Value;

/// Replace the projection's content with a full copy of `source`. The
/// record of truth wins outright, including its nulls.
pub(crate) fn seed(projection: &mut RecordView, source: &RecordView) {
    projection.version.fields = source.version.fields.clone();
    projection.names = source.names.clone();
    projection.addresses = source.addresses.clone();
    projection.identifiers = source.identifiers.clone();
}

/// Fill attributes the projection does not yet carry from `member`.
///
/// Scalar fields backfill per key; a list attribute is taken wholesale from
/// the first member that has any entries, so one member's list is never
/// interleaved with another's.
pub(crate) fn backfill(projection: &mut RecordView, member: &RecordView) {
    for (key, value) in &member.version.fields {
        if value.is_null() {
            continue;
        }
        let slot = projection
            .version
            .fields
            .entry(key.clone())
            .or_insert(Value::Null);
        if slot.is_null() {
            *slot = value.clone();
        }
    }
    if projection.names.is_empty() {
        projection.names = member.names.clone();
    }
    if projection.addresses.is_empty() {
        projection.addresses = member.addresses.clone();
    }
    if projection.identifiers.is_empty() {
        projection.identifiers = member.identifiers.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::{Name, Principal, RecordClass, RecordDraft, WriteContext};
    use medley_storage::RecordStore;
    use serde_json::json;

    fn view_of(draft: RecordDraft) -> RecordView {
        let store = RecordStore::new();
        let ctx = WriteContext::new(Principal::new("tester"), "merge-tests");
        store.insert(draft, &ctx).unwrap()
    }

    #[test]
    fn earlier_member_value_is_never_overwritten() {
        let mut projection = view_of(RecordDraft::new(RecordClass::Master));
        let a = view_of(
            RecordDraft::new(RecordClass::Patient)
                .with_field("dob", json!("1985-03-02"))
                .with_field("gender", Value::Null),
        );
        let b = view_of(
            RecordDraft::new(RecordClass::Patient)
                .with_field("dob", json!("1990-01-01"))
                .with_field("gender", json!("female")),
        );
        backfill(&mut projection, &a);
        backfill(&mut projection, &b);
        assert_eq!(projection.version.fields["dob"], json!("1985-03-02"));
        assert_eq!(projection.version.fields["gender"], json!("female"));
    }

    #[test]
    fn list_attribute_comes_wholesale_from_first_holder() {
        let mut projection = view_of(RecordDraft::new(RecordClass::Master));
        let a = view_of(RecordDraft::new(RecordClass::Patient));
        let b = view_of(
            RecordDraft::new(RecordClass::Patient).with_name(Name::simple("Ada", "Lovelace")),
        );
        let c = view_of(
            RecordDraft::new(RecordClass::Patient).with_name(Name::simple("Augusta", "King")),
        );
        backfill(&mut projection, &a);
        backfill(&mut projection, &b);
        backfill(&mut projection, &c);
        assert_eq!(projection.names, vec![Name::simple("Ada", "Lovelace")]);
    }

    #[test]
    fn seed_copies_nulls_verbatim() {
        let mut projection = view_of(RecordDraft::new(RecordClass::Master));
        let rot = view_of(RecordDraft::new(RecordClass::Patient).with_field("dob", Value::Null));
        let other =
            view_of(RecordDraft::new(RecordClass::Patient).with_field("dob", json!("1970-01-01")));
        seed(&mut projection, &rot);
        // Backfill may still fill a null the record of truth left open.
        backfill(&mut projection, &other);
        assert_eq!(projection.version.fields["dob"], json!("1970-01-01"));
    }
}
