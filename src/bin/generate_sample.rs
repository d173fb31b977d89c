use std::sync::Arc;

use anyhow::Result;
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

/// (province, country, latitude, longitude)
const LOCATIONS: &[(&str, &str, f64, f64)] = &[
    ("Maputo", "Mozambique", -25.97, 32.57),
    ("Gaza", "Mozambique", -23.02, 32.72),
    ("Sofala", "Mozambique", -19.84, 34.84),
    ("Nampula", "Mozambique", -15.12, 39.27),
    ("Tete", "Mozambique", -16.16, 33.59),
    ("Lusaka", "Zambia", -15.39, 28.32),
];

const CATEGORIES: &[&str] = &["Health", "Legal", "Violence", "Education", "Other"];
const GENDERS: &[&str] = &["Female", "Male"];
const LANGUAGES: &[&str] = &["Portuguese", "English", "Changana", "Macua"];
const CHAT_TYPES: &[&str] = &["WhatsApp", "SMS", "Messenger", "Call"];
const STREETS: &[&str] = &["Av. Julius Nyerere", "Av. 24 de Julho", "Rua da Resistencia"];

struct Row {
    date: String,
    duration: Option<f64>,
    category: &'static str,
    gender: &'static str,
    language: &'static str,
    chat_type: &'static str,
    province: &'static str,
    country: &'static str,
    thoroughfare: &'static str,
    age: f64,
    height: f64,
    weight: f64,
    latitude: f64,
    longitude: f64,
    user_id: String,
    call_id: Option<String>,
    chat_id: Option<String>,
}

fn generate(n: usize, rng: &mut SimpleRng) -> Vec<Row> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid start date");
    (0..n)
        .map(|i| {
            let (province, country, lat, lon) = LOCATIONS[(rng.next_u64() % LOCATIONS.len() as u64) as usize];
            let is_call = rng.next_f64() < 0.45;
            let day = start + Duration::days((rng.next_u64() % 180) as i64);
            // A few dates the loader has to coerce to null.
            let date = if i % 97 == 13 {
                "unknown".to_string()
            } else {
                day.format("%Y-%m-%d").to_string()
            };
            let age = rng.range(10.0, 70.0).round();
            Row {
                date,
                duration: is_call.then(|| rng.range(20.0, 1800.0).round()),
                category: rng.pick(CATEGORIES),
                gender: rng.pick(GENDERS),
                language: rng.pick(LANGUAGES),
                chat_type: if is_call { "Call" } else { rng.pick(&CHAT_TYPES[..3]) },
                province,
                country,
                thoroughfare: rng.pick(STREETS),
                age,
                height: rng.range(140.0, 195.0).round(),
                weight: rng.range(40.0, 110.0).round(),
                latitude: lat + rng.range(-0.2, 0.2),
                longitude: lon + rng.range(-0.2, 0.2),
                user_id: format!("u{:04}", rng.next_u64() % (n as u64 / 3 + 1)),
                call_id: is_call.then(|| format!("call-{i:05}")),
                chat_id: (!is_call).then(|| format!("chat-{i:05}")),
            }
        })
        .collect()
}

const HEADER: &[&str] = &[
    "date", "duration", "category", "gender", "language", "chatType", "province", "countryName",
    "thoroughfare", "age", "height", "weight", "latitude", "longitude", "userId", "callId", "chatId",
];

fn write_csv(rows: &[Row], path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;
    for r in rows {
        writer.write_record([
            r.date.clone(),
            r.duration.map(|d| d.to_string()).unwrap_or_default(),
            r.category.to_string(),
            r.gender.to_string(),
            r.language.to_string(),
            r.chat_type.to_string(),
            r.province.to_string(),
            r.country.to_string(),
            r.thoroughfare.to_string(),
            r.age.to_string(),
            r.height.to_string(),
            r.weight.to_string(),
            format!("{:.5}", r.latitude),
            format!("{:.5}", r.longitude),
            r.user_id.clone(),
            r.call_id.clone().unwrap_or_default(),
            r.chat_id.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(rows: &[Row], path: &str) -> Result<()> {
    let text = |f: fn(&Row) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let number = |f: fn(&Row) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
    };
    let optional_text = |f: fn(&Row) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
    };

    let columns: Vec<ArrayRef> = vec![
        text(|r| &r.date),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.duration).collect::<Vec<_>>())),
        text(|r| r.category),
        text(|r| r.gender),
        text(|r| r.language),
        text(|r| r.chat_type),
        text(|r| r.province),
        text(|r| r.country),
        text(|r| r.thoroughfare),
        number(|r| r.age),
        number(|r| r.height),
        number(|r| r.weight),
        number(|r| r.latitude),
        number(|r| r.longitude),
        text(|r| &r.user_id),
        optional_text(|r| r.call_id.as_deref()),
        optional_text(|r| r.chat_id.as_deref()),
    ];

    let fields: Vec<Field> = HEADER
        .iter()
        .zip(&columns)
        .map(|(name, col)| Field::new(*name, col.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let n: usize = std::env::args()
        .nth(1)
        .map(|s| s.parse::<usize>())
        .transpose()?
        .unwrap_or(2000);

    let mut rng = SimpleRng::new(42);
    let rows = generate(n, &mut rng);

    write_csv(&rows, "dashboard_data.csv")?;
    write_parquet(&rows, "dashboard_data.parquet")?;

    println!("Wrote {n} interactions to dashboard_data.csv and dashboard_data.parquet");
    Ok(())
}
