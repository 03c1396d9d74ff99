use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use htng_bridge::model::{DateRange, InventoryRecord, InventoryScope};
use htng_bridge::parser::{InventoryParser, ResponseParser};
use htng_bridge::{BuilderContext, CodecConfig, InventoryNotifBuilder, MessageType, SoapHeader};

const HOTEL: &str = "HOTEL1";

fn records(count: usize) -> Vec<InventoryRecord> {
    let first = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default();
    (0..count)
        .map(|i| {
            let day = first + Duration::days((i / 10) as i64);
            InventoryRecord::direct(
                HOTEL,
                DateRange::single(day),
                InventoryScope::RoomType(format!("ROOM{}", i % 10)),
                (i % 25) as u32,
            )
            .unwrap()
        })
        .collect()
}

fn inventory_response(nodes: usize) -> String {
    let inventories: String = (0..nodes)
        .map(|i| {
            format!(
                r#"<Inventory><StatusApplicationControl Start="2025-03-01" End="2025-03-31" InvTypeCode="ROOM{}"/><InvCounts><InvCount CountType="2" Count="{}"/><InvCount CountType="4" Count="3"/></InvCounts></Inventory>"#,
                i,
                i % 40
            )
        })
        .collect();
    format!(
        r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><OTA_HotelInvCountNotifRS EchoToken="bench"><Success/><Inventories HotelCode="{}">{}</Inventories></OTA_HotelInvCountNotifRS></soap:Body></soap:Envelope>"#,
        HOTEL, inventories
    )
}

pub fn build_benchmark(c: &mut Criterion) {
    let config = CodecConfig::default();
    let header = SoapHeader::new(MessageType::InventoryCountNotif, HOTEL, &config.endpoint);
    let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();
    let ctx = BuilderContext::new(config, header).unwrap().with_today(today);
    let builder = InventoryNotifBuilder::new(ctx);
    let batch = records(100);

    c.bench_function("inventory_batch_100", |b| {
        b.iter(|| builder.build_batch(black_box(&batch)).unwrap())
    });
}

pub fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("inventory_response_parse");
    for nodes in [10, 100, 1000].iter() {
        let raw = inventory_response(*nodes);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &raw, |b, raw| {
            b.iter(|| InventoryParser.parse(black_box(raw), None))
        });
    }
    group.finish();
}

criterion_group!(benches, build_benchmark, parse_benchmark);
criterion_main!(benches);
