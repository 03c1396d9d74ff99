use crate::model::inventory::CountType;
use crate::model::soap::MessageType;
use crate::parser::dom::XmlNode;

// Declared sequence of the ResGlobalInfo children this codec emits
const RES_GLOBAL_INFO_ORDER: &[&str] = &[
    "Comments",
    "SpecialRequests",
    "Guarantee",
    "DepositPayments",
    "Total",
    "HotelReservationIDs",
    "Profiles",
    "BasicPropertyInfo",
];

// Checks serialized output against the schema for its message type.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, message_type: MessageType, xml: &str) -> Result<(), Vec<String>>;
}

// Structural check of the root and required child elements of each message type.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredElementsValidator;

impl RequiredElementsValidator {
    fn check_body(message_type: MessageType, root: &XmlNode, errors: &mut Vec<String>) {
        for attr in ["EchoToken", "TimeStamp", "Version"] {
            if root.attr_non_empty(attr).is_none() {
                errors.push(format!("{} is missing attribute {}", root.name(), attr));
            }
        }

        match message_type {
            MessageType::InventoryCountNotif => {
                let inventories = required_all(root, &["Inventories", "Inventory"], errors);
                for inventory in inventories {
                    required(inventory, "StatusApplicationControl", errors);
                    for count in required_all(inventory, &["InvCounts", "InvCount"], errors) {
                        let valid = count
                            .attr("CountType")
                            .and_then(|c| c.parse::<u8>().ok())
                            .and_then(CountType::from_code)
                            .is_some();
                        if !valid {
                            errors.push(format!(
                                "InvCount has invalid CountType {:?}",
                                count.attr("CountType")
                            ));
                        }
                        if count.attr("Count").and_then(|c| c.parse::<u32>().ok()).is_none() {
                            errors.push("InvCount is missing a numeric Count".to_string());
                        }
                    }
                }
            }
            MessageType::RateNotif => {
                let plans = required_all(root, &["RatePlans", "RatePlan"], errors);
                for plan in plans {
                    if plan.attr_non_empty("RatePlanCode").is_none() {
                        errors.push("RatePlan is missing RatePlanCode".to_string());
                    }
                    for amount in plan.find_all("AdditionalGuestAmount") {
                        if !matches!(amount.attr("AgeQualifyingCode"), Some("10") | Some("8")) {
                            errors.push(format!(
                                "AdditionalGuestAmount has invalid AgeQualifyingCode {:?}",
                                amount.attr("AgeQualifyingCode")
                            ));
                        }
                    }
                    for rate in plan.find_all("Rate") {
                        required(rate, "BaseByGuestAmts", errors);
                    }
                }
            }
            MessageType::ReservationNotif => {
                for reservation in required_all(root, &["HotelReservations", "HotelReservation"], errors) {
                    required(reservation, "UniqueID", errors);
                    if let Some(global) = reservation.child("ResGlobalInfo") {
                        check_sequence(global, RES_GLOBAL_INFO_ORDER, errors);
                    }
                }
            }
            MessageType::ReservationNotifAck => {
                if root.child("Success").is_none() && root.child("Errors").is_none() {
                    errors.push(format!("{} needs Success or Errors", root.name()));
                }
            }
            MessageType::InvBlockNotif => {
                for block in required_all(root, &["InvBlocks", "InvBlock"], errors) {
                    required(block, "InvBlockDates", errors);
                    if block.attr("TransactionAction") != Some("Cancel") {
                        required_all(block, &["RoomTypes", "RoomType"], errors);
                    }
                }
            }
        }
    }
}

impl SchemaValidator for RequiredElementsValidator {
    fn validate(&self, message_type: MessageType, xml: &str) -> Result<(), Vec<String>> {
        let envelope = XmlNode::parse(xml).map_err(|e| vec![e])?;
        let mut errors = Vec::new();

        if envelope.name() != "Envelope" {
            errors.push(format!("root element is {} not Envelope", envelope.name()));
        }
        if envelope.path(&["Header", "Security", "UsernameToken"]).is_none() {
            errors.push("Header is missing the security token".to_string());
        }
        match envelope.path(&["Body", message_type.request_root()]) {
            Some(root) => Self::check_body(message_type, root, &mut errors),
            None => errors.push(format!("Body is missing {}", message_type.request_root())),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn required<'a>(node: &'a XmlNode, name: &str, errors: &mut Vec<String>) -> Option<&'a XmlNode> {
    let found = node.child(name);
    if found.is_none() {
        errors.push(format!("{} is missing {}", node.name(), name));
    }
    found
}

// Follows `wrapper/item` and requires at least one item.
fn required_all<'a>(node: &'a XmlNode, path: &[&str; 2], errors: &mut Vec<String>) -> Vec<&'a XmlNode> {
    let Some(wrapper) = required(node, path[0], errors) else {
        return Vec::new();
    };
    let items: Vec<&XmlNode> = wrapper.children_named(path[1]).collect();
    if items.is_empty() {
        errors.push(format!("{} has no {}", path[0], path[1]));
    }
    items
}

// Children must appear in `order`; names outside it are reported as undeclared.
fn check_sequence(node: &XmlNode, order: &[&str], errors: &mut Vec<String>) {
    let mut last = 0;
    for name in node.child_names() {
        match order.iter().position(|declared| *declared == name) {
            Some(position) if position >= last => last = position,
            Some(_) => errors.push(format!("{} has {} out of sequence", node.name(), name)),
            None => errors.push(format!("{} does not declare {}", node.name(), name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(body: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="s" xmlns:wsse="w"><soap:Header><wsse:Security><wsse:UsernameToken/></wsse:Security></soap:Header><soap:Body>{}</soap:Body></soap:Envelope>"#,
            body
        )
    }

    #[test]
    fn test_valid_inventory_message() {
        let xml = wrap(
            r#"<OTA_HotelInvCountNotifRQ EchoToken="e" TimeStamp="t" Version="1.0"><Inventories><Inventory><StatusApplicationControl/><InvCounts><InvCount CountType="2" Count="5"/></InvCounts></Inventory></Inventories></OTA_HotelInvCountNotifRQ>"#,
        );
        assert!(RequiredElementsValidator
            .validate(MessageType::InventoryCountNotif, &xml)
            .is_ok());
    }

    #[test]
    fn test_unknown_count_type_is_reported() {
        let xml = wrap(
            r#"<OTA_HotelInvCountNotifRQ EchoToken="e" TimeStamp="t" Version="1.0"><Inventories><Inventory><StatusApplicationControl/><InvCounts><InvCount CountType="3" Count="5"/></InvCounts></Inventory></Inventories></OTA_HotelInvCountNotifRQ>"#,
        );
        let errors = RequiredElementsValidator
            .validate(MessageType::InventoryCountNotif, &xml)
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("CountType"));
    }

    #[test]
    fn test_wrong_root_is_reported() {
        let xml = wrap(r#"<OTA_HotelRateNotifRQ EchoToken="e" TimeStamp="t" Version="1.0"/>"#);
        let errors = RequiredElementsValidator
            .validate(MessageType::InventoryCountNotif, &xml)
            .unwrap_err();
        assert!(errors[0].contains("OTA_HotelInvCountNotifRQ"));
    }

    #[test]
    fn test_res_global_info_sequence() {
        let reservation = |global: &str| {
            wrap(&format!(
                r#"<OTA_HotelResNotifRQ EchoToken="e" TimeStamp="t" Version="1.0"><HotelReservations><HotelReservation><UniqueID/><ResGlobalInfo>{}</ResGlobalInfo></HotelReservation></HotelReservations></OTA_HotelResNotifRQ>"#,
                global
            ))
        };

        let ordered = reservation("<Comments/><Guarantee/><Total/><HotelReservationIDs/>");
        assert!(RequiredElementsValidator
            .validate(MessageType::ReservationNotif, &ordered)
            .is_ok());

        let swapped = reservation("<Guarantee/><Comments/><Total/>");
        let errors = RequiredElementsValidator
            .validate(MessageType::ReservationNotif, &swapped)
            .unwrap_err();
        assert_eq!(errors, vec!["ResGlobalInfo has Comments out of sequence".to_string()]);

        let stray = reservation("<Total/><InvBlockCode>WED25</InvBlockCode>");
        let errors = RequiredElementsValidator
            .validate(MessageType::ReservationNotif, &stray)
            .unwrap_err();
        assert!(errors[0].contains("does not declare InvBlockCode"));
    }

    #[test]
    fn test_ack_needs_outcome() {
        let xml = wrap(r#"<OTA_HotelResNotifRS EchoToken="e" TimeStamp="t" Version="1.0"/>"#);
        assert!(RequiredElementsValidator
            .validate(MessageType::ReservationNotifAck, &xml)
            .is_err());
    }
}
