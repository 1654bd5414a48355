//! Deterministic synthetic retail sales dataset, 2022 through 2024.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const REGIONS: &[(&str, &[&str])] = &[
    ("North America", &["United States", "Canada", "Mexico"]),
    (
        "Europe",
        &["Germany", "France", "United Kingdom", "Italy", "Spain"],
    ),
    (
        "Asia Pacific",
        &["Japan", "China", "Australia", "India", "South Korea"],
    ),
    ("Latin America", &["Brazil", "Argentina", "Colombia", "Chile"]),
];

type PriceRange = (f64, f64);

const PRODUCTS: &[(&str, &[(&str, PriceRange)])] = &[
    (
        "Electronics",
        &[
            ("Laptops", (800.0, 2500.0)),
            ("Smartphones", (400.0, 1200.0)),
            ("Tablets", (200.0, 800.0)),
            ("Accessories", (20.0, 150.0)),
        ],
    ),
    (
        "Furniture",
        &[
            ("Office Chairs", (150.0, 800.0)),
            ("Desks", (200.0, 1200.0)),
            ("Storage", (80.0, 400.0)),
            ("Lighting", (30.0, 200.0)),
        ],
    ),
    (
        "Office Supplies",
        &[
            ("Paper & Notebooks", (5.0, 50.0)),
            ("Pens & Markers", (3.0, 30.0)),
            ("Organizers", (10.0, 80.0)),
            ("Printers & Ink", (50.0, 300.0)),
        ],
    ),
    (
        "Clothing",
        &[
            ("Formal Wear", (80.0, 400.0)),
            ("Casual Wear", (20.0, 150.0)),
            ("Sportswear", (30.0, 200.0)),
            ("Accessories", (10.0, 100.0)),
        ],
    ),
];

const SEGMENTS: &[(&str, f64)] = &[
    ("Consumer", 1.0),
    ("Corporate", 2.5),
    ("Small Business", 1.5),
    ("Government", 3.0),
];

const SEASONAL: [f64; 12] = [
    0.8, 0.75, 0.9, 0.95, 1.0, 1.05, 1.1, 1.15, 1.1, 1.2, 1.4, 1.5,
];

const MARGINS: &[(&str, PriceRange)] = &[
    ("Electronics", (0.15, 0.30)),
    ("Furniture", (0.25, 0.45)),
    ("Office Supplies", (0.35, 0.55)),
    ("Clothing", (0.40, 0.65)),
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const FIRST_YEAR: i32 = 2022;
pub const LAST_YEAR: i32 = 2024;
const YEARLY_GROWTH: f64 = 0.12;

#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub order_id: String,
    pub order_date: String,
    pub year: i32,
    pub quarter: String,
    pub month: u32,
    pub month_name: String,
    pub region: String,
    pub country: String,
    pub category: String,
    pub subcategory: String,
    pub customer_segment: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub profit_margin: f64,
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn days_in_range() -> u32 {
    (FIRST_YEAR..=LAST_YEAR)
        .map(|y| if is_leap(y) { 366 } else { 365 })
        .sum()
}

/// Converts a day offset from Jan 1st of `FIRST_YEAR` into (year, month, day).
fn date_from_offset(mut offset: u32) -> (i32, u32, u32) {
    let mut year = FIRST_YEAR;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if offset < len {
            break;
        }
        offset -= len;
        year += 1;
    }
    let mut month = 1;
    loop {
        let len = days_in_month(year, month);
        if offset < len {
            break;
        }
        offset -= len;
        month += 1;
    }
    (year, month, offset + 1)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Draws from an exponential distribution with the given mean.
fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    let u: f64 = rng.r#gen();
    -(1.0 - u).ln() * mean
}

/// Generates `n` sales ordered by date. The same `seed` always yields the
/// same rows.
pub fn generate(n: usize, seed: u64) -> Vec<SaleRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let span = days_in_range();
    let mut records = Vec::with_capacity(n);

    for i in 0..n {
        let (region, countries) = REGIONS[rng.gen_range(0..REGIONS.len())];
        let country = countries.choose(&mut rng).copied().unwrap_or(region);
        let (category, subcategories) = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
        let (subcategory, (low, high)) = subcategories[rng.gen_range(0..subcategories.len())];
        let (segment, segment_mult) = SEGMENTS[rng.gen_range(0..SEGMENTS.len())];

        let (year, month, day) = date_from_offset(rng.gen_range(0..span));
        let quarter = (month - 1) / 3 + 1;
        let season_mult = SEASONAL[(month - 1) as usize];
        let year_mult = 1.0 + f64::from(year - FIRST_YEAR) * YEARLY_GROWTH;

        let base_price = rng.gen_range(low..high);
        let unit_price = round2(base_price * segment_mult * 0.4);
        let quantity =
            ((exponential(&mut rng, 2.0) * season_mult * year_mult) as i64).max(1);
        let revenue = round2(unit_price * quantity as f64);

        let (margin_low, margin_high) = MARGINS
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, range)| *range)
            .unwrap_or((0.2, 0.4));
        let margin = rng.gen_range(margin_low..margin_high);
        let cost = round2(revenue * (1.0 - margin));
        let profit = round2(revenue - cost);

        records.push(SaleRecord {
            order_id: format!("ORD-{:05}", i + 1),
            order_date: format!("{year:04}-{month:02}-{day:02}"),
            year,
            quarter: format!("Q{quarter}"),
            month,
            month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
            region: region.to_string(),
            country: country.to_string(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            customer_segment: segment.to_string(),
            quantity,
            unit_price,
            revenue,
            cost,
            profit,
            profit_margin: round2(margin * 100.0),
        });
    }

    records.sort_by(|a, b| a.order_date.cmp(&b.order_date));
    records
}
