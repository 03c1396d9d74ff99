use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::common::{
    checked_sum, require_currency, require_non_empty, require_non_negative, DateRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestCategory {
    Adult,
    Child,
    Youth,
    Infant,
}

impl GuestCategory {
    pub fn age_qualifying_code(&self) -> u8 {
        match self {
            GuestCategory::Adult => 10,
            GuestCategory::Child => 8,
            GuestCategory::Youth => 9,
            GuestCategory::Infant => 7,
        }
    }

    pub fn from_age_qualifying_code(code: u8) -> Option<Self> {
        match code {
            10 => Some(GuestCategory::Adult),
            8 => Some(GuestCategory::Child),
            9 => Some(GuestCategory::Youth),
            7 => Some(GuestCategory::Infant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub lines: Vec<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    given_name: String,
    surname: String,
    name_prefix: Option<String>,
    contact: Option<ContactInfo>,
    address: Option<Address>,
    category: GuestCategory,
    primary: bool,
}

impl Guest {
    pub fn new(given_name: &str, surname: &str, category: GuestCategory) -> Result<Self, ModelError> {
        require_non_empty("surname", surname)?;
        Ok(Self {
            given_name: given_name.trim().to_string(),
            surname: surname.trim().to_string(),
            name_prefix: None,
            contact: None,
            address: None,
            category,
            primary: false,
        })
    }

    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = Some(prefix.to_string());
        self
    }

    pub fn with_contact(mut self, contact: ContactInfo) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn as_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn given_name(&self) -> &str {
        &self.given_name
    }

    pub fn surname(&self) -> &str {
        &self.surname
    }

    pub fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }

    pub fn contact(&self) -> Option<&ContactInfo> {
        self.contact.as_ref()
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn category(&self) -> GuestCategory {
        self.category
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCounts {
    adults: u32,
    children: u32,
    youths: u32,
    infants: u32,
}

impl GuestCounts {
    pub fn new(adults: u32, children: u32, youths: u32, infants: u32) -> Result<Self, ModelError> {
        if adults == 0 {
            return Err(ModelError::OutOfRange {
                field: "adults".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(Self {
            adults,
            children,
            youths,
            infants,
        })
    }

    pub fn adults(&self) -> u32 {
        self.adults
    }

    pub fn children(&self) -> u32 {
        self.children
    }

    pub fn count(&self, category: GuestCategory) -> u32 {
        match category {
            GuestCategory::Adult => self.adults,
            GuestCategory::Child => self.children,
            GuestCategory::Youth => self.youths,
            GuestCategory::Infant => self.infants,
        }
    }

    // Categories with a non-zero count, adults first.
    pub fn non_zero(&self) -> Vec<(GuestCategory, u32)> {
        [
            GuestCategory::Adult,
            GuestCategory::Child,
            GuestCategory::Youth,
            GuestCategory::Infant,
        ]
        .into_iter()
        .map(|c| (c, self.count(c)))
        .filter(|(_, n)| *n > 0)
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRate {
    pub date: NaiveDate,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStay {
    index: u32,
    date_range: DateRange,
    room_type_code: String,
    rate_plan_code: String,
    guest_counts: GuestCounts,
    total_amount: Option<Decimal>,
    daily_rates: Vec<DailyRate>,
    confirmation_number: Option<String>,
    special_offers: Vec<String>,
}

impl RoomStay {
    pub fn new(
        index: u32,
        date_range: DateRange,
        room_type_code: &str,
        rate_plan_code: &str,
        guest_counts: GuestCounts,
    ) -> Result<Self, ModelError> {
        require_non_empty("room_type_code", room_type_code)?;
        require_non_empty("rate_plan_code", rate_plan_code)?;
        if date_range.nights() < 1 {
            return Err(ModelError::InvalidDateRange {
                start: date_range.start().to_string(),
                end: date_range.end().to_string(),
            });
        }

        Ok(Self {
            index,
            date_range,
            room_type_code: room_type_code.to_string(),
            rate_plan_code: rate_plan_code.to_string(),
            guest_counts,
            total_amount: None,
            daily_rates: Vec::new(),
            confirmation_number: None,
            special_offers: Vec::new(),
        })
    }

    pub fn with_total(mut self, amount: Decimal) -> Result<Self, ModelError> {
        require_non_negative("room_stay.total", amount)?;
        self.total_amount = Some(amount);
        Ok(self)
    }

    // Nightly breakdown; every date must be a night of the stay.
    pub fn with_daily_rates(mut self, daily_rates: Vec<DailyRate>) -> Result<Self, ModelError> {
        for rate in &daily_rates {
            require_non_negative("daily_rate", rate.amount)?;
            if rate.date < self.date_range.start() || rate.date >= self.date_range.end() {
                return Err(ModelError::OutOfRange {
                    field: "daily_rate.date".to_string(),
                    value: rate.date.to_string(),
                });
            }
        }
        if checked_sum(daily_rates.iter().map(|r| r.amount)).is_none() {
            return Err(ModelError::OutOfRange {
                field: "room_stay.total".to_string(),
                value: "overflow".to_string(),
            });
        }
        self.daily_rates = daily_rates;
        Ok(self)
    }

    pub fn with_confirmation_number(mut self, number: &str) -> Self {
        self.confirmation_number = Some(number.to_string());
        self
    }

    pub fn with_special_offers(mut self, offers: Vec<String>) -> Self {
        self.special_offers = offers;
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn room_type_code(&self) -> &str {
        &self.room_type_code
    }

    pub fn rate_plan_code(&self) -> &str {
        &self.rate_plan_code
    }

    pub fn guest_counts(&self) -> &GuestCounts {
        &self.guest_counts
    }

    pub fn daily_rates(&self) -> &[DailyRate] {
        &self.daily_rates
    }

    pub fn confirmation_number(&self) -> Option<&str> {
        self.confirmation_number.as_deref()
    }

    pub fn special_offers(&self) -> &[String] {
        &self.special_offers
    }

    // Sum of the nightly breakdown when present, otherwise the declared total.
    pub fn total(&self) -> Decimal {
        if self.daily_rates.is_empty() {
            self.total_amount.unwrap_or(Decimal::ZERO)
        } else {
            // with_daily_rates rejects breakdowns that overflow
            checked_sum(self.daily_rates.iter().map(|r| r.amount)).unwrap_or(Decimal::MAX)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationType {
    Transient,
    TravelAgency,
    Corporate,
    Group,
    Package,
    AlternatePayment,
}

impl ReservationType {
    pub fn carries_profile(&self) -> bool {
        matches!(
            self,
            ReservationType::TravelAgency | ReservationType::Corporate | ReservationType::Group
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionMode {
    New,
    Modify,
    Cancel,
}

impl TransactionMode {
    pub fn res_status(&self) -> &'static str {
        match self {
            TransactionMode::New => "Commit",
            TransactionMode::Modify => "Modify",
            TransactionMode::Cancel => "Cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    TravelAgency {
        name: String,
        iata_number: String,
        commission_percent: Option<Decimal>,
        contact: Option<ContactInfo>,
    },
    Corporate {
        company_name: String,
        corporate_id: String,
        contact: Option<ContactInfo>,
    },
    Group {
        group_name: String,
        contact: Option<ContactInfo>,
    },
}

impl Profile {
    pub fn travel_agency(
        name: &str,
        iata_number: &str,
        commission_percent: Option<Decimal>,
    ) -> Result<Self, ModelError> {
        require_non_empty("agency name", name)?;
        let digits = iata_number.chars().all(|c| c.is_ascii_digit());
        if !digits || !(7..=8).contains(&iata_number.len()) {
            return Err(ModelError::InvalidCode {
                field: "iata_number".to_string(),
                value: iata_number.to_string(),
            });
        }
        if let Some(pct) = commission_percent {
            if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(ModelError::OutOfRange {
                    field: "commission_percent".to_string(),
                    value: pct.to_string(),
                });
            }
        }
        Ok(Profile::TravelAgency {
            name: name.to_string(),
            iata_number: iata_number.to_string(),
            commission_percent,
            contact: None,
        })
    }

    pub fn corporate(company_name: &str, corporate_id: &str) -> Result<Self, ModelError> {
        require_non_empty("company name", company_name)?;
        require_non_empty("corporate_id", corporate_id)?;
        Ok(Profile::Corporate {
            company_name: company_name.to_string(),
            corporate_id: corporate_id.to_string(),
            contact: None,
        })
    }

    pub fn group(group_name: &str) -> Result<Self, ModelError> {
        require_non_empty("group name", group_name)?;
        Ok(Profile::Group {
            group_name: group_name.to_string(),
            contact: None,
        })
    }

    pub fn with_contact(self, info: ContactInfo) -> Self {
        match self {
            Profile::TravelAgency {
                name,
                iata_number,
                commission_percent,
                ..
            } => Profile::TravelAgency {
                name,
                iata_number,
                commission_percent,
                contact: Some(info),
            },
            Profile::Corporate {
                company_name,
                corporate_id,
                ..
            } => Profile::Corporate {
                company_name,
                corporate_id,
                contact: Some(info),
            },
            Profile::Group { group_name, .. } => Profile::Group {
                group_name,
                contact: Some(info),
            },
        }
    }

    pub fn reservation_type(&self) -> ReservationType {
        match self {
            Profile::TravelAgency { .. } => ReservationType::TravelAgency,
            Profile::Corporate { .. } => ReservationType::Corporate,
            Profile::Group { .. } => ReservationType::Group,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Profile::TravelAgency { name, .. } => name,
            Profile::Corporate { company_name, .. } => company_name,
            Profile::Group { group_name, .. } => group_name,
        }
    }

    pub fn contact(&self) -> Option<&ContactInfo> {
        match self {
            Profile::TravelAgency { contact, .. }
            | Profile::Corporate { contact, .. }
            | Profile::Group { contact, .. } => contact.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialRequest {
    pub code: Option<String>,
    pub text: String,
    pub date_range: Option<DateRange>,
    pub room_stay_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub code: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub date_range: Option<DateRange>,
    pub room_stay_index: Option<u32>,
}

impl ServiceRequest {
    pub fn checked_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    // Unit price times quantity, saturating at `Decimal::MAX`.
    pub fn total(&self) -> Decimal {
        self.checked_total().unwrap_or(Decimal::MAX)
    }

    pub fn is_free(&self) -> bool {
        self.unit_price.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guarantee {
    Card {
        card_code: String,
        card_number: String,
        holder_name: String,
        // MMYY
        expire_date: String,
    },
    Code {
        guarantee_code: String,
        description: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternatePayment {
    pub provider: String,
    pub amount: Decimal,
}

// Root aggregate of a reservation message. Only obtainable through [`ReservationDraft::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    reservation_type: ReservationType,
    transaction: TransactionMode,
    reservation_id: String,
    confirmation_number: Option<String>,
    transaction_id: Option<String>,
    hotel_code: String,
    currency: String,
    primary_guest: Guest,
    additional_guests: Vec<Guest>,
    room_stays: Vec<RoomStay>,
    profile: Option<Profile>,
    guarantee: Option<Guarantee>,
    deposit: Option<Deposit>,
    alternate_payment: Option<AlternatePayment>,
    block_code: Option<String>,
    package_code: Option<String>,
    special_requests: Vec<SpecialRequest>,
    service_requests: Vec<ServiceRequest>,
    comments: Vec<String>,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn draft(
        reservation_type: ReservationType,
        transaction: TransactionMode,
        reservation_id: &str,
        hotel_code: &str,
        primary_guest: Guest,
    ) -> ReservationDraft {
        ReservationDraft {
            inner: Reservation {
                reservation_type,
                transaction,
                reservation_id: reservation_id.to_string(),
                confirmation_number: None,
                transaction_id: None,
                hotel_code: hotel_code.to_string(),
                currency: String::new(),
                primary_guest,
                additional_guests: Vec::new(),
                room_stays: Vec::new(),
                profile: None,
                guarantee: None,
                deposit: None,
                alternate_payment: None,
                block_code: None,
                package_code: None,
                special_requests: Vec::new(),
                service_requests: Vec::new(),
                comments: Vec::new(),
                created_at: Utc::now(),
                modified_at: None,
            },
        }
    }

    // Starts a modified copy; the original is untouched.
    pub fn to_draft(&self) -> ReservationDraft {
        ReservationDraft {
            inner: self.clone(),
        }
    }

    pub fn reservation_type(&self) -> ReservationType {
        self.reservation_type
    }

    pub fn transaction(&self) -> TransactionMode {
        self.transaction
    }

    pub fn reservation_id(&self) -> &str {
        &self.reservation_id
    }

    pub fn confirmation_number(&self) -> Option<&str> {
        self.confirmation_number.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn hotel_code(&self) -> &str {
        &self.hotel_code
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn primary_guest(&self) -> &Guest {
        &self.primary_guest
    }

    pub fn additional_guests(&self) -> &[Guest] {
        &self.additional_guests
    }

    pub fn room_stays(&self) -> &[RoomStay] {
        &self.room_stays
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn guarantee(&self) -> Option<&Guarantee> {
        self.guarantee.as_ref()
    }

    pub fn deposit(&self) -> Option<&Deposit> {
        self.deposit.as_ref()
    }

    pub fn alternate_payment(&self) -> Option<&AlternatePayment> {
        self.alternate_payment.as_ref()
    }

    pub fn block_code(&self) -> Option<&str> {
        self.block_code.as_deref()
    }

    pub fn package_code(&self) -> Option<&str> {
        self.package_code.as_deref()
    }

    pub fn special_requests(&self) -> &[SpecialRequest] {
        &self.special_requests
    }

    pub fn service_requests(&self) -> &[ServiceRequest] {
        &self.service_requests
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    // Room totals plus costed services.
    pub fn grand_total(&self) -> Decimal {
        self.checked_grand_total().unwrap_or(Decimal::MAX)
    }

    fn checked_grand_total(&self) -> Option<Decimal> {
        let services = self
            .service_requests
            .iter()
            .map(ServiceRequest::checked_total)
            .collect::<Option<Vec<_>>>()?;
        checked_sum(self.room_stays.iter().map(RoomStay::total).chain(services))
    }

    // Overall stay span across every room.
    pub fn stay_range(&self) -> Option<DateRange> {
        self.room_stays
            .iter()
            .map(|s| s.date_range())
            .reduce(|acc, r| acc.union(&r))
    }
}

// Mutable staging area for a [`Reservation`]; invariants are checked once in `build`.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    inner: Reservation,
}

impl ReservationDraft {
    pub fn transaction(mut self, transaction: TransactionMode) -> Self {
        self.inner.transaction = transaction;
        self
    }

    pub fn confirmation_number(mut self, number: &str) -> Self {
        self.inner.confirmation_number = Some(number.to_string());
        self
    }

    pub fn transaction_id(mut self, id: &str) -> Self {
        self.inner.transaction_id = Some(id.to_string());
        self
    }

    pub fn currency(mut self, currency: &str) -> Self {
        self.inner.currency = currency.to_string();
        self
    }

    pub fn additional_guest(mut self, guest: Guest) -> Self {
        self.inner.additional_guests.push(guest.as_primary(false));
        self
    }

    pub fn room_stay(mut self, stay: RoomStay) -> Self {
        self.inner.room_stays.push(stay);
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.inner.profile = Some(profile);
        self
    }

    pub fn guarantee(mut self, guarantee: Guarantee) -> Self {
        self.inner.guarantee = Some(guarantee);
        self
    }

    pub fn deposit(mut self, deposit: Deposit) -> Self {
        self.inner.deposit = Some(deposit);
        self
    }

    pub fn alternate_payment(mut self, payment: AlternatePayment) -> Self {
        self.inner.alternate_payment = Some(payment);
        self
    }

    pub fn block_code(mut self, code: &str) -> Self {
        self.inner.block_code = Some(code.to_string());
        self
    }

    pub fn package_code(mut self, code: &str) -> Self {
        self.inner.package_code = Some(code.to_string());
        self
    }

    pub fn special_request(mut self, request: SpecialRequest) -> Self {
        self.inner.special_requests.push(request);
        self
    }

    pub fn service_request(mut self, request: ServiceRequest) -> Self {
        self.inner.service_requests.push(request);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.inner.comments.push(text.to_string());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.inner.created_at = at;
        self
    }

    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.inner.modified_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Reservation, ModelError> {
        let mut res = self.inner;
        require_non_empty("reservation_id", &res.reservation_id)?;
        require_non_empty("hotel_code", &res.hotel_code)?;
        if res.currency.is_empty() {
            return Err(ModelError::MissingField("currency".to_string()));
        }
        require_currency(&res.currency)?;

        if res.room_stays.is_empty() && res.transaction != TransactionMode::Cancel {
            return Err(ModelError::MissingField("room_stays".to_string()));
        }
        let mut indexes = BTreeSet::new();
        for stay in &res.room_stays {
            if !indexes.insert(stay.index()) {
                return Err(ModelError::Inconsistent(format!(
                    "room stay index {} used twice",
                    stay.index()
                )));
            }
        }
        let dangling = res
            .special_requests
            .iter()
            .filter_map(|r| r.room_stay_index)
            .chain(res.service_requests.iter().filter_map(|r| r.room_stay_index))
            .find(|i| !indexes.contains(i));
        if let Some(index) = dangling {
            if res.transaction != TransactionMode::Cancel {
                return Err(ModelError::Inconsistent(format!(
                    "request refers to unknown room stay {}",
                    index
                )));
            }
        }

        if res.reservation_type == ReservationType::Group
            && res.block_code.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(ModelError::MissingField("block_code".to_string()));
        }
        if let Some(profile) = &res.profile {
            if profile.reservation_type() != res.reservation_type {
                return Err(ModelError::Inconsistent(format!(
                    "{:?} profile on a {:?} reservation",
                    profile.reservation_type(),
                    res.reservation_type
                )));
            }
        }
        if let Some(deposit) = &res.deposit {
            require_non_negative("deposit", deposit.amount)?;
        }
        for service in &res.service_requests {
            require_non_negative("service.unit_price", service.unit_price)?;
        }
        if res.checked_grand_total().is_none() {
            return Err(ModelError::OutOfRange {
                field: "grand_total".to_string(),
                value: "overflow".to_string(),
            });
        }

        res.primary_guest = res.primary_guest.as_primary(true);
        Ok(res)
    }
}
