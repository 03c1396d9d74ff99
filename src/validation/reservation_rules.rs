use rust_decimal::Decimal;

use crate::config::CodeKind;
use crate::error::Violations;
use crate::model::reservation::{Reservation, ReservationType, TransactionMode};
use crate::validation::RuleContext;

// Checks that depend on the outbound header or on the reservation type.
pub fn validate_reservation(
    reservation: &Reservation,
    header_hotel_code: &str,
    ctx: &RuleContext<'_>,
) -> Violations {
    let mut violations = Violations::new();

    if reservation.hotel_code() != header_hotel_code {
        violations.push(
            "reservation.hotel_mismatch",
            format!(
                "reservation is for {} but the message is addressed to {}",
                reservation.hotel_code(),
                header_hotel_code
            ),
        );
    }
    ctx.check_code(
        &mut violations,
        "reservation.hotel_code",
        CodeKind::Hotel,
        reservation.hotel_code(),
    );

    // A cancellation only carries the identifier
    if reservation.transaction() == TransactionMode::Cancel {
        return violations;
    }

    for stay in reservation.room_stays() {
        ctx.check_code(
            &mut violations,
            "reservation.room_type_code",
            CodeKind::RoomType,
            stay.room_type_code(),
        );
        ctx.check_code(
            &mut violations,
            "reservation.rate_plan_code",
            CodeKind::RatePlan,
            stay.rate_plan_code(),
        );
    }

    let kind = reservation.reservation_type();
    match kind {
        ReservationType::TravelAgency | ReservationType::Corporate => {
            if reservation.profile().is_none() {
                violations.push(
                    "reservation.profile_required",
                    format!("{:?} reservation needs a matching profile", kind),
                );
            }
        }
        ReservationType::Package => {
            if reservation.package_code().is_none() {
                violations.push(
                    "reservation.package_code_required",
                    "package reservation needs a package code",
                );
            }
        }
        ReservationType::AlternatePayment => match reservation.alternate_payment() {
            Some(payment)
                if !payment.provider.trim().is_empty() && payment.amount > Decimal::ZERO => {}
            _ => violations.push(
                "reservation.alternate_payment_required",
                "alternate payment reservation needs a payment type and a positive amount",
            ),
        },
        // block code and profile match are guaranteed by the draft
        ReservationType::Group | ReservationType::Transient => {}
    }

    if kind != ReservationType::AlternatePayment && reservation.alternate_payment().is_some() {
        violations.push(
            "reservation.alternate_payment_unexpected",
            format!("{:?} reservation carries alternate payment details", kind),
        );
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodeRules, CodecConfig};
    use crate::model::common::{date, range};
    use crate::model::reservation::{
        AlternatePayment, Guest, GuestCategory, GuestCounts, Profile, RoomStay,
    };
    use test_case::test_case;

    fn check(reservation: &Reservation, header_hotel: &str) -> Violations {
        let config = CodecConfig::default();
        let codes = CodeRules::compile(&config).unwrap();
        let ctx = RuleContext {
            config: &config,
            codes: &codes,
            today: date("2025-01-01"),
        };
        validate_reservation(reservation, header_hotel, &ctx)
    }

    fn draft(kind: ReservationType) -> crate::model::reservation::ReservationDraft {
        let stay = RoomStay::new(
            1,
            range("2025-06-01", "2025-06-03"),
            "KING",
            "BAR",
            GuestCounts::new(2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        Reservation::draft(
            kind,
            TransactionMode::New,
            "R100",
            "HOTEL1",
            Guest::new("Grace", "Hopper", GuestCategory::Adult).unwrap(),
        )
        .currency("USD")
        .room_stay(stay)
    }

    #[test]
    fn test_hotel_must_match_header() {
        let res = draft(ReservationType::Transient).build().unwrap();
        assert!(check(&res, "HOTEL2").has_rule("reservation.hotel_mismatch"));
        assert!(check(&res, "HOTEL1").is_empty());
    }

    #[test_case(None, Some("reservation.alternate_payment_required"); "missing payment")]
    #[test_case(Some(("", 50)), Some("reservation.alternate_payment_required"); "missing provider")]
    #[test_case(Some(("PayPal", 0)), Some("reservation.alternate_payment_required"); "zero amount")]
    #[test_case(Some(("PayPal", 50)), None; "complete")]
    fn test_alternate_payment_fields(payment: Option<(&str, i64)>, expected: Option<&str>) {
        let mut d = draft(ReservationType::AlternatePayment);
        if let Some((provider, amount)) = payment {
            d = d.alternate_payment(AlternatePayment {
                provider: provider.to_string(),
                amount: Decimal::new(amount, 0),
            });
        }
        let violations = check(&d.build().unwrap(), "HOTEL1");
        match expected {
            Some(rule) => assert!(violations.has_rule(rule)),
            None => assert!(violations.is_empty(), "{}", violations),
        }
    }

    #[test]
    fn test_corporate_needs_profile() {
        let res = draft(ReservationType::Corporate).build().unwrap();
        assert!(check(&res, "HOTEL1").has_rule("reservation.profile_required"));

        let res = draft(ReservationType::Corporate)
            .profile(Profile::corporate("Initech", "CORP42").unwrap())
            .build()
            .unwrap();
        assert!(check(&res, "HOTEL1").is_empty());
    }

    #[test]
    fn test_package_needs_code() {
        let res = draft(ReservationType::Package).build().unwrap();
        assert!(check(&res, "HOTEL1").has_rule("reservation.package_code_required"));
    }
}
