use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::config::CodeKind;
use crate::error::Violations;
use crate::model::inventory::{CountMethod, CountType, InventoryRecord, InventoryScope};
use crate::validation::RuleContext;

// Checks a whole inventory batch. Batch-level limits short-circuit the per-record checks.
pub fn validate_inventory_batch(records: &[InventoryRecord], ctx: &RuleContext<'_>) -> Violations {
    let mut violations = Violations::new();
    let cap = ctx.config.inventory.batch_cap;

    if records.is_empty() {
        violations.push("inventory.empty_batch", "inventory batch is empty");
        return violations;
    }
    if records.len() > cap {
        violations.push(
            "inventory.batch_size",
            format!("{} records exceed the batch cap of {}", records.len(), cap),
        );
        return violations;
    }

    let hotels: BTreeSet<&str> = records.iter().map(|r| r.hotel_code()).collect();
    if hotels.len() > 1 {
        violations.push(
            "inventory.mixed_hotels",
            format!("one batch may only address one hotel, got {:?}", hotels),
        );
    }

    let mut seen = HashSet::new();
    for record in records {
        let key = record.slot_key();
        if !seen.insert(key.clone()) {
            violations.push(
                "inventory.duplicate_slot",
                format!(
                    "{}/{} {}..{} appears more than once",
                    key.0,
                    key.1,
                    key.2.start(),
                    key.2.end()
                ),
            );
        }
    }

    for (i, record) in records.iter().enumerate() {
        violations.extend(validate_record(i, record, ctx));
    }

    violations
}

fn validate_record(index: usize, record: &InventoryRecord, ctx: &RuleContext<'_>) -> Violations {
    let mut violations = Violations::new();
    let label = format!("record {} ({})", index, record.scope().key());

    ctx.check_code(
        &mut violations,
        "inventory.hotel_code",
        CodeKind::Hotel,
        record.hotel_code(),
    );
    if let InventoryScope::RoomType(code) = record.scope() {
        ctx.check_code(
            &mut violations,
            "inventory.room_type_code",
            CodeKind::RoomType,
            code,
        );
    }

    match record.method() {
        CountMethod::Direct => {
            if record.counts().len() > 1 {
                violations.push(
                    "inventory.direct_method_exclusive",
                    format!("{}: Available must be the only count type", label),
                );
            }
        }
        CountMethod::Calculated => {
            if record.has(CountType::DefiniteSold) && !record.has(CountType::TentativeSold) {
                violations.push(
                    "inventory.tentative_sold_required",
                    format!("{}: DefiniteSold requires TentativeSold", label),
                );
            }
            if let Some(tentative) = record.count(CountType::TentativeSold) {
                if tentative > 0 {
                    warn!(
                        record = index,
                        tentative, "TentativeSold is always transmitted as zero"
                    );
                }
            }
        }
    }

    let range = record.date_range();
    let max_days = ctx.config.inventory.max_span_days;
    if range.days() > max_days {
        violations.push(
            "inventory.date_span",
            format!(
                "{}: {} days exceeds the maximum span of {}",
                label,
                range.days(),
                max_days
            ),
        );
    }
    if range.end() < ctx.today {
        violations.push(
            "inventory.past_dates",
            format!("{}: range ending {} is in the past", label, range.end()),
        );
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodeRules, CodecConfig};
    use crate::model::common::{date, range};
    use crate::model::inventory::InventoryCount;
    use test_case::test_case;

    fn check(records: &[InventoryRecord]) -> Violations {
        let config = CodecConfig::default();
        let codes = CodeRules::compile(&config).unwrap();
        let ctx = RuleContext {
            config: &config,
            codes: &codes,
            today: date("2025-01-01"),
        };
        validate_inventory_batch(records, &ctx)
    }

    fn record(room: &str, counts: &[(CountType, i64)]) -> InventoryRecord {
        InventoryRecord::new(
            "HOTEL1",
            range("2025-06-01", "2025-06-30"),
            InventoryScope::RoomType(room.to_string()),
            counts
                .iter()
                .map(|(t, n)| InventoryCount::new(*t, *n).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test_case(&[(CountType::Available, 5)], None; "direct alone")]
    #[test_case(&[(CountType::Available, 5), (CountType::Physical, 10)], Some("inventory.direct_method_exclusive"); "direct mixed")]
    #[test_case(&[(CountType::Physical, 10), (CountType::DefiniteSold, 4)], Some("inventory.tentative_sold_required"); "definite without tentative")]
    #[test_case(&[(CountType::Physical, 10), (CountType::DefiniteSold, 4), (CountType::TentativeSold, 0)], None; "calculated complete")]
    #[test_case(&[(CountType::Physical, 10), (CountType::OutOfOrder, 1)], None; "calculated without sold")]
    fn test_count_combinations(counts: &[(CountType, i64)], expected: Option<&str>) {
        let violations = check(&[record("KING", counts)]);
        match expected {
            Some(rule) => assert!(violations.has_rule(rule), "{}", violations),
            None => assert!(violations.is_empty(), "{}", violations),
        }
    }

    #[test]
    fn test_batch_cap_short_circuits() {
        let records: Vec<_> = (0..101)
            .map(|i| record(&format!("RT{}", i), &[(CountType::Available, 1)]))
            .collect();
        let violations = check(&records);
        assert_eq!(violations.len(), 1);
        assert!(violations.has_rule("inventory.batch_size"));
    }

    #[test]
    fn test_duplicate_slot() {
        let a = record("KING", &[(CountType::Available, 1)]);
        let violations = check(&[a.clone(), a]);
        assert!(violations.has_rule("inventory.duplicate_slot"));
    }

    #[test]
    fn test_mixed_hotels() {
        let a = record("KING", &[(CountType::Available, 1)]);
        let b = InventoryRecord::direct(
            "HOTEL2",
            range("2025-06-01", "2025-06-30"),
            InventoryScope::Property,
            3,
        )
        .unwrap();
        assert!(check(&[a, b]).has_rule("inventory.mixed_hotels"));
    }

    #[test]
    fn test_past_and_too_long_ranges() {
        let past = InventoryRecord::direct(
            "HOTEL1",
            range("2024-01-01", "2024-01-31"),
            InventoryScope::Property,
            3,
        )
        .unwrap();
        let long = InventoryRecord::direct(
            "HOTEL1",
            range("2025-01-01", "2026-06-30"),
            InventoryScope::RoomType("KING".into()),
            3,
        )
        .unwrap();
        let violations = check(&[past, long]);
        assert!(violations.has_rule("inventory.past_dates"));
        assert!(violations.has_rule("inventory.date_span"));
    }

    #[test]
    fn test_room_type_pattern_enforced() {
        let bad = record("KING SUITE", &[(CountType::Available, 1)]);
        assert!(check(&[bad]).has_rule("inventory.room_type_code"));
    }
}
