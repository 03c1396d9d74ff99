use tracing::{info, warn};

use crate::builder::{status_application_control, BuilderContext, Element, MessageBuilder};
use crate::error::CodecError;
use crate::model::inventory::{CountMethod, CountType, InventoryRecord};
use crate::model::soap::MessageType;
use crate::validation::validate_inventory_batch;

// Builds `OTA_HotelInvCountNotifRQ` messages.
#[derive(Debug, Clone)]
pub struct InventoryNotifBuilder {
    ctx: BuilderContext,
}

impl InventoryNotifBuilder {
    pub fn new(ctx: BuilderContext) -> Self {
        Self { ctx }
    }

    pub fn build_batch(&self, records: &[InventoryRecord]) -> Result<String, CodecError> {
        info!(
            records = records.len(),
            message_id = %self.ctx.header().message_id,
            "building inventory batch"
        );
        self.build(records)
    }

    fn inventory(record: &InventoryRecord) -> Element {
        let counts = record.counts().iter().map(|c| {
            // the hub never receives tentative holds
            let value = match (record.method(), c.count_type) {
                (CountMethod::Calculated, CountType::TentativeSold) => 0,
                _ => c.count,
            };
            Element::new("InvCount")
                .attr("CountType", c.count_type.code())
                .attr("Count", value)
        });

        Element::new("Inventory")
            .child(status_application_control(record.date_range(), record.scope()))
            .child(Element::new("InvCounts").children(counts))
    }
}

impl MessageBuilder for InventoryNotifBuilder {
    type Input = [InventoryRecord];

    fn message_type(&self) -> MessageType {
        MessageType::InventoryCountNotif
    }

    fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn validate(&self, records: &[InventoryRecord]) -> Result<(), CodecError> {
        let violations = validate_inventory_batch(records, &self.ctx.rules());
        if !violations.is_empty() {
            warn!(count = violations.len(), "inventory batch rejected: {}", violations);
        }
        violations.into_result()
    }

    fn build_body(&self, records: &[InventoryRecord]) -> Result<Element, CodecError> {
        let hotel_code = records
            .first()
            .map(|r| r.hotel_code())
            .unwrap_or(self.ctx.header().hotel_code.as_str());

        Ok(self.ctx.body_root(self.message_type()).child(
            Element::new("Inventories")
                .attr("HotelCode", hotel_code)
                .children(records.iter().map(Self::inventory)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::context;
    use crate::builder::RequiredElementsValidator;
    use crate::model::common::range;
    use crate::model::inventory::{InventoryCount, InventoryScope};
    use crate::parser::dom::XmlNode;
    use std::sync::Arc;

    fn builder() -> InventoryNotifBuilder {
        InventoryNotifBuilder::new(
            context(MessageType::InventoryCountNotif, "HOTEL1")
                .with_schema_validator(Arc::new(RequiredElementsValidator)),
        )
    }

    fn direct(room: &str, available: u32) -> InventoryRecord {
        InventoryRecord::direct(
            "HOTEL1",
            range("2025-06-01", "2025-06-30"),
            InventoryScope::RoomType(room.to_string()),
            available,
        )
        .unwrap()
    }

    fn calculated(counts: &[(CountType, i64)]) -> InventoryRecord {
        InventoryRecord::new(
            "HOTEL1",
            range("2025-06-01", "2025-06-30"),
            InventoryScope::Property,
            counts
                .iter()
                .map(|(ct, n)| InventoryCount::new(*ct, *n).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn inv_counts(xml: &str) -> Vec<Vec<(String, String)>> {
        let doc = XmlNode::parse(xml).unwrap();
        doc.find_all("InvCounts")
            .into_iter()
            .map(|counts| {
                counts
                    .children_named("InvCount")
                    .map(|c| {
                        (
                            c.attr("CountType").unwrap_or_default().to_string(),
                            c.attr("Count").unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_direct_method_sends_only_available() {
        let xml = builder()
            .build_batch(&[direct("KING", 5), direct("QUEEN", 3)])
            .unwrap();
        let counts = inv_counts(&xml);
        assert_eq!(counts.len(), 2);
        for record in &counts {
            assert_eq!(record.len(), 1);
            assert_eq!(record[0].0, "2");
        }
        assert_eq!(counts[0][0].1, "5");
        assert_eq!(counts[1][0].1, "3");
    }

    #[test]
    fn test_calculated_method_requires_tentative_sold() {
        let record = calculated(&[(CountType::Physical, 20), (CountType::DefiniteSold, 4)]);
        let err = builder().build_batch(&[record]).unwrap_err();
        assert!(err
            .violations()
            .unwrap()
            .has_rule("inventory.tentative_sold_required"));
    }

    #[test]
    fn test_tentative_sold_is_sent_as_zero() {
        let record = calculated(&[
            (CountType::Physical, 20),
            (CountType::DefiniteSold, 4),
            (CountType::TentativeSold, 2),
        ]);
        let xml = builder().build_batch(&[record]).unwrap();
        let counts = &inv_counts(&xml)[0];
        assert_eq!(
            counts,
            &vec![
                ("1".to_string(), "20".to_string()),
                ("4".to_string(), "4".to_string()),
                ("5".to_string(), "0".to_string()),
            ]
        );
        assert!(xml.contains(r#"AllInvCode="true""#));
    }

    #[test]
    fn test_oversized_batch_is_rejected_before_building() {
        let records: Vec<InventoryRecord> = (0..101)
            .map(|i| {
                InventoryRecord::direct(
                    "HOTEL1",
                    range("2025-06-01", "2025-06-01"),
                    InventoryScope::RoomType(format!("R{}", i)),
                    1,
                )
                .unwrap()
            })
            .collect();
        let err = builder().build_batch(&records).unwrap_err();
        let violations = err.violations().unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations.has_rule("inventory.batch_size"));
    }

    #[test]
    fn test_envelope_and_body_layout() {
        let xml = builder().build_batch(&[direct("KING", 5)]).unwrap();
        let doc = XmlNode::parse(&xml).unwrap();
        let root = doc.path(&["Body", "OTA_HotelInvCountNotifRQ"]).unwrap();
        assert_eq!(root.attr("EchoToken"), Some("echo-1"));
        let inventories = root.child("Inventories").unwrap();
        assert_eq!(inventories.attr("HotelCode"), Some("HOTEL1"));
        let sac = inventories
            .path(&["Inventory", "StatusApplicationControl"])
            .unwrap();
        assert_eq!(sac.attr("Start"), Some("2025-06-01"));
        assert_eq!(sac.attr("End"), Some("2025-06-30"));
        assert_eq!(sac.attr("InvTypeCode"), Some("KING"));
        assert_eq!(
            doc.path(&["Header", "Action"]).map(|a| a.text()),
            Some("http://htng.org/2011B/OTA_HotelInvCountNotifRQ")
        );
    }
}
