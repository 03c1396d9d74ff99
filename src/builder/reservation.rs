use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::{iso_date, BuilderContext, Element, MessageBuilder};
use crate::error::{CodecError, Violations};
use crate::model::common::format_amount;
use crate::model::reservation::{
    AlternatePayment, Guarantee, Guest, Profile, Reservation, ReservationType, RoomStay,
    TransactionMode,
};
use crate::model::soap::MessageType;
use crate::validation::validate_reservation;

// UniqueID / HotelReservationID type codes
pub const RESERVATION_ID_TYPE: &str = "14";
pub const CONFIRMATION_ID_TYPE: &str = "10";
pub const TRANSACTION_ID_TYPE: &str = "18";

// ProfileType codes
pub const CUSTOMER_PROFILE_TYPE: &str = "1";
pub const COMPANY_PROFILE_TYPE: &str = "3";
pub const TRAVEL_AGENT_PROFILE_TYPE: &str = "4";
pub const GROUP_PROFILE_TYPE: &str = "6";

pub const PACKAGE_RATE_PLAN_TYPE: &str = "12";

// Free-text comment carrying alternate payment details.
pub fn alternate_payment_note(payment: &AlternatePayment) -> String {
    format!(
        "Alternate Provider: {}, Amount: {}",
        payment.provider,
        format_amount(payment.amount)
    )
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// Builds `OTA_HotelResNotifRQ` messages.
#[derive(Debug, Clone)]
pub struct ReservationNotifBuilder {
    ctx: BuilderContext,
}

impl ReservationNotifBuilder {
    pub fn new(ctx: BuilderContext) -> Self {
        Self { ctx }
    }

    fn hotel_reservation(&self, res: &Reservation) -> Element {
        let unique_id = Element::new("UniqueID")
            .attr("Type", RESERVATION_ID_TYPE)
            .attr("ID", res.reservation_id());

        if res.transaction() == TransactionMode::Cancel {
            return Element::new("HotelReservation")
                .attr("ResStatus", res.transaction().res_status())
                .child(unique_id)
                .child(
                    Element::new("CancelRequest")
                        .attr("CancelType", "Cancel")
                        .attr_opt("ConfirmationNumber", res.confirmation_number()),
                );
        }

        let currency = res.currency();
        let services = res.service_requests().iter().map(|s| {
            Element::new("Service")
                .attr("ServiceInventoryCode", &s.code)
                .attr("Quantity", s.quantity)
                .attr_opt("ServiceRPH", s.room_stay_index)
                .attr("ServicePricingType", if s.is_free() { "Free" } else { "Per use" })
                .child(
                    Element::new("Price").child(
                        Element::new("Total")
                            .attr("AmountAfterTax", format_amount(s.total()))
                            .attr("CurrencyCode", currency),
                    ),
                )
                .child(
                    Element::new("ServiceDetails")
                        .child_opt(s.date_range.map(|r| {
                            Element::new("TimeSpan")
                                .attr("Start", iso_date(r.start()))
                                .attr("End", iso_date(r.end()))
                        }))
                        .child(
                            Element::new("ServiceDescription")
                                .child(Element::new("Text").text(&s.description)),
                        ),
                )
        });

        let mut guests = vec![guest_element(1, res.primary_guest())];
        guests.extend(
            res.additional_guests()
                .iter()
                .enumerate()
                .map(|(i, g)| guest_element(i as u32 + 2, g)),
        );

        Element::new("HotelReservation")
            .attr("ResStatus", res.transaction().res_status())
            .attr("CreateDateTime", timestamp(res.created_at()))
            .attr_opt("LastModifyDateTime", res.modified_at().map(timestamp))
            .child(unique_id)
            .child(
                Element::new("RoomStays")
                    .children(res.room_stays().iter().map(|s| room_stay_element(res, s))),
            )
            .wrapped("Services", services)
            .child(Element::new("ResGuests").children(guests))
            .child(self.res_global_info(res))
    }

    fn res_global_info(&self, res: &Reservation) -> Element {
        let currency = res.currency();

        let mut comments: Vec<String> = res.comments().to_vec();
        if let Some(payment) = res.alternate_payment() {
            comments.push(alternate_payment_note(payment));
        }

        let special_requests = res.special_requests().iter().map(|r| {
            Element::new("SpecialRequest")
                .attr_opt("RequestCode", r.code.as_deref())
                .attr_opt("RPH", r.room_stay_index)
                .attr_opt("Start", r.date_range.map(|d| iso_date(d.start())))
                .attr_opt("End", r.date_range.map(|d| iso_date(d.end())))
                .child(Element::new("Text").text(&r.text))
        });

        let ids = [
            Some((RESERVATION_ID_TYPE, res.reservation_id())),
            res.confirmation_number().map(|c| (CONFIRMATION_ID_TYPE, c)),
            res.transaction_id().map(|t| (TRANSACTION_ID_TYPE, t)),
        ]
        .into_iter()
        .flatten()
        .map(|(kind, value)| {
            Element::new("HotelReservationID")
                .attr("ResID_Type", kind)
                .attr("ResID_Value", value)
        });

        Element::new("ResGlobalInfo")
            .wrapped(
                "Comments",
                comments
                    .into_iter()
                    .map(|c| Element::new("Comment").child(Element::new("Text").text(c))),
            )
            .wrapped("SpecialRequests", special_requests)
            .child_opt(res.guarantee().map(guarantee_element))
            .child_opt(res.deposit().map(|d| {
                Element::new("DepositPayments").child(
                    Element::new("GuaranteePayment")
                        .child(
                            Element::new("AmountPercent")
                                .attr("Amount", format_amount(d.amount))
                                .attr("CurrencyCode", currency),
                        )
                        .child_opt(d.due_date.map(|due| {
                            Element::new("Deadline").attr("AbsoluteDeadline", iso_date(due))
                        })),
                )
            }))
            .child(
                Element::new("Total")
                    .attr("AmountAfterTax", format_amount(res.grand_total()))
                    .attr("CurrencyCode", currency),
            )
            .child(Element::new("HotelReservationIDs").children(ids))
            .child_opt(res.profile().map(profile_element))
            .child(Element::new("BasicPropertyInfo").attr("HotelCode", res.hotel_code()))
    }
}

fn room_stay_element(res: &Reservation, stay: &RoomStay) -> Element {
    let currency = res.currency();
    let range = stay.date_range();

    let rate_plan = Element::new("RatePlan")
        .attr("RatePlanCode", stay.rate_plan_code())
        .attr_if(
            res.reservation_type() == ReservationType::Package,
            "RatePlanType",
            PACKAGE_RATE_PLAN_TYPE,
        )
        .attr_opt("PromotionCode", res.package_code());

    let nightly = stay.daily_rates().iter().map(|r| {
        Element::new("Rate")
            .attr("EffectiveDate", iso_date(r.date))
            .attr("ExpireDate", iso_date(r.date.succ_opt().unwrap_or(r.date)))
            .child(
                Element::new("Base")
                    .attr("AmountAfterTax", format_amount(r.amount))
                    .attr("CurrencyCode", currency),
            )
    });
    // group block codes travel on RoomRate
    let room_rates = if stay.daily_rates().is_empty() && res.block_code().is_none() {
        None
    } else {
        Some(
            Element::new("RoomRates").child(
                Element::new("RoomRate")
                    .attr("RoomTypeCode", stay.room_type_code())
                    .attr("RatePlanCode", stay.rate_plan_code())
                    .attr_opt("InvBlockCode", res.block_code())
                    .attr("NumberOfUnits", 1)
                    .wrapped("Rates", nightly),
            ),
        )
    };

    let counts = stay.guest_counts().non_zero().into_iter().map(|(category, n)| {
        Element::new("GuestCount")
            .attr("AgeQualifyingCode", category.age_qualifying_code())
            .attr("Count", n)
    });

    let mut comments: Vec<Element> = stay
        .special_offers()
        .iter()
        .map(|offer| {
            Element::new("Comment")
                .attr("Name", "SpecialOffer")
                .child(Element::new("Text").text(offer))
        })
        .collect();
    if let Some(number) = stay.confirmation_number() {
        comments.push(
            Element::new("Comment")
                .attr("Name", "ConfirmationNumber")
                .child(Element::new("Text").text(number)),
        );
    }

    Element::new("RoomStay")
        .attr("IndexNumber", stay.index())
        .child(
            Element::new("RoomTypes")
                .child(Element::new("RoomType").attr("RoomTypeCode", stay.room_type_code())),
        )
        .child(Element::new("RatePlans").child(rate_plan))
        .child_opt(room_rates)
        .child(Element::new("GuestCounts").children(counts))
        .child(
            Element::new("TimeSpan")
                .attr("Start", iso_date(range.start()))
                .attr("End", iso_date(range.end())),
        )
        .child(
            Element::new("Total")
                .attr("AmountAfterTax", format_amount(stay.total()))
                .attr("CurrencyCode", currency),
        )
        .child(Element::new("BasicPropertyInfo").attr("HotelCode", res.hotel_code()))
        .wrapped("Comments", comments)
}

fn guest_element(rph: u32, guest: &Guest) -> Element {
    let contact = guest.contact();
    let address = guest.address().map(|a| {
        Element::new("Address")
            .children(
                a.lines
                    .iter()
                    .map(|l| Element::new("AddressLine").text(l)),
            )
            .child_opt(a.city.as_ref().map(|c| Element::new("CityName").text(c)))
            .child_opt(a.postal_code.as_ref().map(|p| Element::new("PostalCode").text(p)))
            .child_opt(
                a.state
                    .as_ref()
                    .map(|s| Element::new("StateProv").attr("StateCode", s)),
            )
            .child_opt(
                a.country_code
                    .as_ref()
                    .map(|c| Element::new("CountryName").attr("Code", c)),
            )
    });

    let customer = Element::new("Customer")
        .child(
            Element::new("PersonName")
                .child_opt(guest.name_prefix().map(|p| Element::new("NamePrefix").text(p)))
                .child(Element::new("GivenName").text(guest.given_name()))
                .child(Element::new("Surname").text(guest.surname())),
        )
        .child_opt(
            contact
                .and_then(|c| c.phone.as_ref())
                .map(|p| Element::new("Telephone").attr("PhoneNumber", p)),
        )
        .child_opt(
            contact
                .and_then(|c| c.email.as_ref())
                .map(|e| Element::new("Email").text(e)),
        )
        .child_opt(address);

    Element::new("ResGuest")
        .attr("ResGuestRPH", rph)
        .attr("AgeQualifyingCode", guest.category().age_qualifying_code())
        .attr("PrimaryIndicator", guest.is_primary())
        .child(
            Element::new("Profiles").child(
                Element::new("ProfileInfo").child(
                    Element::new("Profile")
                        .attr("ProfileType", CUSTOMER_PROFILE_TYPE)
                        .child(customer),
                ),
            ),
        )
}

fn guarantee_element(guarantee: &Guarantee) -> Element {
    match guarantee {
        Guarantee::Card {
            card_code,
            card_number,
            holder_name,
            expire_date,
        } => Element::new("Guarantee").attr("GuaranteeType", "CC/DC/AX").child(
            Element::new("GuaranteesAccepted").child(
                Element::new("GuaranteeAccepted").child(
                    Element::new("PaymentCard")
                        .attr("CardCode", card_code)
                        .attr("CardNumber", card_number)
                        .attr("ExpireDate", expire_date)
                        .child(Element::new("CardHolderName").text(holder_name)),
                ),
            ),
        ),
        Guarantee::Code {
            guarantee_code,
            description,
        } => Element::new("Guarantee")
            .attr("GuaranteeCode", guarantee_code)
            .child_opt(description.as_ref().map(|d| {
                Element::new("GuaranteeDescription").child(Element::new("Text").text(d))
            })),
    }
}

fn profile_element(profile: &Profile) -> Element {
    let (profile_type, body) = match profile {
        Profile::TravelAgency {
            name,
            iata_number,
            commission_percent,
            ..
        } => (
            TRAVEL_AGENT_PROFILE_TYPE,
            Element::new("CompanyInfo")
                .child(
                    Element::new("CompanyName")
                        .attr("Code", iata_number)
                        .attr("CodeContext", "IATA")
                        .text(name),
                )
                .child_opt(commission_percent.map(|pct| {
                    Element::new("Commission").attr("Percent", pct.normalize())
                })),
        ),
        Profile::Corporate {
            company_name,
            corporate_id,
            ..
        } => (
            COMPANY_PROFILE_TYPE,
            Element::new("CompanyInfo").child(
                Element::new("CompanyName")
                    .attr("Code", corporate_id)
                    .attr("CodeContext", "CorporateID")
                    .text(company_name),
            ),
        ),
        Profile::Group { group_name, .. } => (
            GROUP_PROFILE_TYPE,
            Element::new("CompanyInfo")
                .child(Element::new("CompanyName").attr("CodeContext", "Group").text(group_name)),
        ),
    };

    let body = match profile.contact() {
        Some(contact) => body
            .child_opt(
                contact
                    .phone
                    .as_ref()
                    .map(|p| Element::new("TelephoneInfo").attr("PhoneNumber", p)),
            )
            .child_opt(contact.email.as_ref().map(|e| Element::new("Email").text(e))),
        None => body,
    };

    Element::new("Profiles").child(
        Element::new("ProfileInfo")
            .child(Element::new("Profile").attr("ProfileType", profile_type).child(body)),
    )
}

impl MessageBuilder for ReservationNotifBuilder {
    type Input = Reservation;

    fn message_type(&self) -> MessageType {
        MessageType::ReservationNotif
    }

    fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn validate(&self, res: &Reservation) -> Result<(), CodecError> {
        let violations =
            validate_reservation(res, &self.ctx.header().hotel_code, &self.ctx.rules());
        if !violations.is_empty() {
            warn!(
                reservation_id = res.reservation_id(),
                count = violations.len(),
                "reservation rejected: {}",
                violations
            );
        }
        violations.into_result()
    }

    fn build_body(&self, res: &Reservation) -> Result<Element, CodecError> {
        info!(
            reservation_id = res.reservation_id(),
            kind = ?res.reservation_type(),
            transaction = ?res.transaction(),
            message_id = %self.ctx.header().message_id,
            "building reservation notification"
        );
        Ok(self.ctx.body_root(self.message_type()).child(
            Element::new("HotelReservations").child(self.hotel_reservation(res)),
        ))
    }
}

// Outcome reported back to the hub for a reservation it pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationAck {
    Success {
        reservation_id: String,
        confirmation_number: Option<String>,
    },
    Failure {
        // OTA error warning type, e.g. `3` for a business rule.
        error_type: String,
        code: String,
        short_text: String,
        message: String,
    },
}

// Builds `OTA_HotelResNotifRS` acknowledgements.
#[derive(Debug, Clone)]
pub struct ReservationAckBuilder {
    ctx: BuilderContext,
}

impl ReservationAckBuilder {
    pub fn new(ctx: BuilderContext) -> Self {
        Self { ctx }
    }
}

impl MessageBuilder for ReservationAckBuilder {
    type Input = ReservationAck;

    fn message_type(&self) -> MessageType {
        MessageType::ReservationNotifAck
    }

    fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn validate(&self, ack: &ReservationAck) -> Result<(), CodecError> {
        let mut violations = Violations::new();
        match ack {
            ReservationAck::Success { reservation_id, .. } => {
                if reservation_id.trim().is_empty() {
                    violations.push("ack.reservation_id", "success needs the reservation id");
                }
            }
            ReservationAck::Failure {
                error_type, code, ..
            } => {
                if code.trim().is_empty() || error_type.trim().is_empty() {
                    violations.push("ack.error_code", "error needs a type and a code");
                }
            }
        }
        violations.into_result()
    }

    fn build_body(&self, ack: &ReservationAck) -> Result<Element, CodecError> {
        let root = self.ctx.body_root(self.message_type());
        let body = match ack {
            ReservationAck::Success {
                reservation_id,
                confirmation_number,
            } => {
                let ids = Element::new("HotelReservationIDs")
                    .child(
                        Element::new("HotelReservationID")
                            .attr("ResID_Type", RESERVATION_ID_TYPE)
                            .attr("ResID_Value", reservation_id),
                    )
                    .child_opt(confirmation_number.as_ref().map(|c| {
                        Element::new("HotelReservationID")
                            .attr("ResID_Type", CONFIRMATION_ID_TYPE)
                            .attr("ResID_Value", c)
                    }));
                root.child(Element::new("Success")).child(
                    Element::new("HotelReservations").child(
                        Element::new("HotelReservation")
                            .child(
                                Element::new("UniqueID")
                                    .attr("Type", RESERVATION_ID_TYPE)
                                    .attr("ID", reservation_id),
                            )
                            .child(Element::new("ResGlobalInfo").child(ids)),
                    ),
                )
            }
            ReservationAck::Failure {
                error_type,
                code,
                short_text,
                message,
            } => root.child(
                Element::new("Errors").child(
                    Element::new("Error")
                        .attr("Type", error_type)
                        .attr("Code", code)
                        .attr("ShortText", short_text)
                        .text(message),
                ),
            ),
        };
        Ok(body)
    }
}
