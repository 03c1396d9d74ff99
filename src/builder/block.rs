use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::builder::{iso_date, BuilderContext, Element, MessageBuilder};
use crate::config::CodeKind;
use crate::error::{CodecError, Violations};
use crate::model::block::{BlockStatus, InventoryBlock, RoomAllocation};
use crate::model::common::format_amount;
use crate::model::soap::MessageType;

// Builds `OTA_HotelInvBlockNotifRQ` messages for group allotments.
#[derive(Debug, Clone)]
pub struct InvBlockNotifBuilder {
    ctx: BuilderContext,
}

impl InvBlockNotifBuilder {
    pub fn new(ctx: BuilderContext) -> Self {
        Self { ctx }
    }

    fn room_type(block: &InventoryBlock, allocation: &RoomAllocation) -> Element {
        let range = block.date_range();
        let rate_plan = allocation.rate.map(|amount| {
            Element::new("RatePlans").child(
                Element::new("RatePlan")
                    .attr("RatePlanCode", block.block_code())
                    .child(
                        Element::new("BaseByGuestAmts").child(
                            Element::new("BaseByGuestAmt")
                                .attr("NumberOfGuests", 1)
                                .attr("AmountAfterTax", format_amount(amount))
                                .attr("CurrencyCode", block.currency()),
                        ),
                    ),
            )
        });

        Element::new("RoomType")
            .attr("RoomTypeCode", &allocation.room_type_code)
            .child(
                Element::new("RoomTypeAllocations").child(
                    Element::new("RoomTypeAllocation")
                        .attr("Start", iso_date(range.start()))
                        .attr("End", iso_date(range.end()))
                        .attr("NumberOfUnits", allocation.units),
                ),
            )
            .child_opt(rate_plan)
    }
}

impl MessageBuilder for InvBlockNotifBuilder {
    type Input = InventoryBlock;

    fn message_type(&self) -> MessageType {
        MessageType::InvBlockNotif
    }

    fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn validate(&self, block: &InventoryBlock) -> Result<(), CodecError> {
        let ctx = self.ctx.rules();
        let mut violations = Violations::new();

        if block.hotel_code() != self.ctx.header().hotel_code {
            violations.push(
                "block.hotel_mismatch",
                format!(
                    "block {} is for {} but the message is addressed to {}",
                    block.block_code(),
                    block.hotel_code(),
                    self.ctx.header().hotel_code
                ),
            );
        }
        ctx.check_code(&mut violations, "block.hotel_code", CodeKind::Hotel, block.hotel_code());

        if block.status() != BlockStatus::Cancel && block.allocations().is_empty() {
            violations.push(
                "block.allocations_required",
                format!("block {} allocates no rooms", block.block_code()),
            );
        }
        let mut seen = BTreeSet::new();
        for allocation in block.allocations() {
            ctx.check_code(
                &mut violations,
                "block.room_type_code",
                CodeKind::RoomType,
                &allocation.room_type_code,
            );
            if !seen.insert(allocation.room_type_code.as_str()) {
                violations.push(
                    "block.duplicate_room_type",
                    format!("room type {} allocated twice", allocation.room_type_code),
                );
            }
        }

        let max_days = ctx.config.inventory.max_span_days;
        if block.date_range().days() > max_days {
            violations.push(
                "block.date_span",
                format!(
                    "block {} spans {} days, more than {}",
                    block.block_code(),
                    block.date_range().days(),
                    max_days
                ),
            );
        }

        if !violations.is_empty() {
            warn!(block = block.block_code(), "inventory block rejected: {}", violations);
        }
        violations.into_result()
    }

    fn build_body(&self, block: &InventoryBlock) -> Result<Element, CodecError> {
        info!(
            block = block.block_code(),
            status = ?block.status(),
            rooms = block.allocations().len(),
            "building inventory block notification"
        );
        let range = block.date_range();

        let inv_block = Element::new("InvBlock")
            .attr("InvBlockCode", block.block_code())
            .attr_if(!block.block_name().is_empty(), "InvBlockName", block.block_name())
            .attr("TransactionAction", block.status().transaction_action())
            .child(Element::new("HotelRef").attr("HotelCode", block.hotel_code()))
            .child(
                Element::new("InvBlockDates")
                    .attr("Start", iso_date(range.start()))
                    .attr("End", iso_date(range.end()))
                    .attr_opt("AbsoluteCutoff", block.cutoff_date().map(iso_date)),
            )
            .child(
                Element::new("RoomTypes").children(
                    block
                        .allocations()
                        .iter()
                        .map(|a| Self::room_type(block, a)),
                ),
            );

        Ok(self
            .ctx
            .body_root(self.message_type())
            .child(Element::new("InvBlocks").child(inv_block)))
    }
}
