use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::common::DateRange;
use crate::model::inventory::{CountType, InventoryScope};
use crate::model::soap::{MessageType, SoapResponse};
use crate::parser::{range_of, ResponseParser, XmlNode};

// Counts the hub confirmed, keyed by room type (or `"property"`) and count type.
pub type ProcessedCounts = BTreeMap<String, BTreeMap<CountType, u32>>;

#[derive(Debug, Clone)]
pub struct InventoryResponse {
    pub base: SoapResponse,
    pub hotel_code: Option<String>,
    pub processed_counts: ProcessedCounts,
    // Room types in document order, without duplicates.
    pub room_types: Vec<String>,
    // Earliest start to latest end over all inventory nodes.
    pub date_range: Option<DateRange>,
    pub property_level: bool,
}

impl InventoryResponse {
    fn from_base(base: SoapResponse) -> Self {
        Self {
            base,
            hotel_code: None,
            processed_counts: BTreeMap::new(),
            room_types: Vec::new(),
            date_range: None,
            property_level: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.base.success
    }

    pub fn count(&self, scope: &str, count_type: CountType) -> Option<u32> {
        self.processed_counts
            .get(scope)
            .and_then(|counts| counts.get(&count_type))
            .copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryParser;

impl InventoryParser {
    fn hotel_code(root: &XmlNode) -> Option<String> {
        root.child("Inventories")
            .and_then(|inv| inv.attr_non_empty("HotelCode"))
            .or_else(|| {
                root.find_all("StatusApplicationControl")
                    .into_iter()
                    .find_map(|sac| sac.attr_non_empty("HotelCode"))
            })
            .map(str::to_string)
    }

    fn scope_of(sac: &XmlNode) -> Option<InventoryScope> {
        if let Some(code) = sac.attr_non_empty("InvTypeCode") {
            return Some(InventoryScope::RoomType(code.to_string()));
        }
        match sac.attr("AllInvCode") {
            Some("true") | Some("1") => Some(InventoryScope::Property),
            _ => None,
        }
    }

    fn counts_of(inventory: &XmlNode, warnings: &mut Vec<String>) -> BTreeMap<CountType, u32> {
        let mut counts = BTreeMap::new();
        let Some(inv_counts) = inventory.child("InvCounts") else {
            return counts;
        };
        for node in inv_counts.children_named("InvCount") {
            let raw_type = node.attr("CountType").unwrap_or_default();
            let Some(count_type) = raw_type.parse::<u8>().ok().and_then(CountType::from_code) else {
                debug!(count_type = raw_type, "skipping unknown count type");
                warnings.push(format!("ignored unknown CountType {:?}", raw_type));
                continue;
            };
            match node.attr("Count").and_then(|c| c.trim().parse::<u32>().ok()) {
                Some(count) => {
                    counts.insert(count_type, count);
                }
                None => warnings.push(format!(
                    "InvCount {} has no numeric Count",
                    count_type.code()
                )),
            }
        }
        counts
    }
}

impl ResponseParser for InventoryParser {
    type Output = InventoryResponse;

    fn message_type(&self) -> MessageType {
        MessageType::InventoryCountNotif
    }

    fn extract(&self, root: &XmlNode, base: SoapResponse) -> InventoryResponse {
        let mut result = InventoryResponse::from_base(base);
        result.hotel_code = Self::hotel_code(root);

        let mut warnings = Vec::new();
        for inventory in root.find_all("Inventory") {
            let Some(sac) = inventory.child("StatusApplicationControl") else {
                warnings.push("Inventory without StatusApplicationControl".to_string());
                continue;
            };
            let Some(scope) = Self::scope_of(sac) else {
                warnings.push("StatusApplicationControl names no room type".to_string());
                continue;
            };

            if let Some(range) = range_of(sac) {
                result.date_range = Some(match result.date_range {
                    Some(seen) => seen.union(&range),
                    None => range,
                });
            }

            match &scope {
                InventoryScope::Property => result.property_level = true,
                InventoryScope::RoomType(code) => {
                    if !result.room_types.contains(code) {
                        result.room_types.push(code.clone());
                    }
                }
            }

            let counts = Self::counts_of(inventory, &mut warnings);
            result
                .processed_counts
                .entry(scope.key().to_string())
                .or_default()
                .extend(counts);
        }

        if !warnings.is_empty() {
            warn!(warnings = warnings.len(), "inventory response had unreadable entries");
        }
        result.base.warnings.extend(warnings);
        result
    }

    fn failed(&self, base: SoapResponse) -> InventoryResponse {
        InventoryResponse::from_base(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::range;
    use std::time::Duration;

    fn wrap(body: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{}</soap:Body></soap:Envelope>"#,
            body
        )
    }

    fn king_queen() -> String {
        wrap(
            r#"<OTA_HotelInvCountNotifRS xmlns="http://www.opentravel.org/OTA/2003/05" EchoToken="echo-9" Version="1.0">
                 <Success/>
                 <Inventories HotelCode="HOTEL1">
                   <Inventory>
                     <StatusApplicationControl Start="2025-03-01" End="2025-03-05" InvTypeCode="KING"/>
                     <InvCounts><InvCount CountType="2" Count="5"/></InvCounts>
                   </Inventory>
                   <Inventory>
                     <StatusApplicationControl Start="2025-02-27" End="2025-03-02" InvTypeCode="QUEEN"/>
                     <InvCounts><InvCount CountType="2" Count="3"/></InvCounts>
                   </Inventory>
                 </Inventories>
               </OTA_HotelInvCountNotifRS>"#,
        )
    }

    #[test]
    fn test_processed_counts_per_room_type() {
        let response = InventoryParser.parse(&king_queen(), Some(Duration::from_millis(40)));

        let mut expected = ProcessedCounts::new();
        expected.insert("KING".into(), BTreeMap::from([(CountType::Available, 5)]));
        expected.insert("QUEEN".into(), BTreeMap::from([(CountType::Available, 3)]));

        assert!(response.is_success());
        assert_eq!(response.processed_counts, expected);
        assert_eq!(response.room_types, vec!["KING", "QUEEN"]);
        assert_eq!(response.hotel_code.as_deref(), Some("HOTEL1"));
        assert_eq!(response.base.echo_token.as_deref(), Some("echo-9"));
        assert_eq!(response.base.duration, Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_date_range_spans_all_nodes() {
        let response = InventoryParser.parse(&king_queen(), None);
        assert_eq!(response.date_range, Some(range("2025-02-27", "2025-03-05")));
    }

    #[test]
    fn test_property_level_and_unknown_count_types() {
        let raw = wrap(
            r#"<OTA_HotelInvCountNotifRS><Success/><Inventories>
                 <Inventory>
                   <StatusApplicationControl Start="2025-03-01" End="2025-03-01" AllInvCode="true" HotelCode="HOTEL7"/>
                   <InvCounts><InvCount CountType="1" Count="80"/><InvCount CountType="3" Count="1"/></InvCounts>
                 </Inventory>
               </Inventories></OTA_HotelInvCountNotifRS>"#,
        );
        let response = InventoryParser.parse(&raw, None);
        assert!(response.property_level);
        assert!(response.room_types.is_empty());
        assert_eq!(response.hotel_code.as_deref(), Some("HOTEL7"));
        assert_eq!(response.count("property", CountType::Physical), Some(80));
        assert_eq!(response.processed_counts["property"].len(), 1);
        assert!(response.base.warnings.iter().any(|w| w.contains("CountType")));
    }

    #[test]
    fn test_fault_yields_empty_failure() {
        let raw = wrap(
            "<soap:Fault><faultcode>soap:Server</faultcode><faultstring>Down</faultstring></soap:Fault>",
        );
        let response = InventoryParser.parse(&raw, None);
        assert!(!response.is_success());
        assert_eq!(response.base.error_code.as_deref(), Some("soap:Server"));
        assert!(response.processed_counts.is_empty());
    }

    #[test]
    fn test_wrong_root_is_missing_root() {
        let raw = wrap("<OTA_HotelRateNotifRS><Success/></OTA_HotelRateNotifRS>");
        let response = InventoryParser.parse(&raw, None);
        assert_eq!(response.base.error_code.as_deref(), Some("MISSING_ROOT"));
    }
}
