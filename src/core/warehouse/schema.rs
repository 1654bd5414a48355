//! Star schema for the retail sales cube.

pub const FACT_TABLE: &str = "fact_sales";

pub const TABLES: [&str; 5] = [
    "fact_sales",
    "dim_date",
    "dim_geography",
    "dim_product",
    "dim_customer",
];

/// DDL executed on open and returned by the schema endpoint.
pub const DDL: &str = "\
CREATE TABLE IF NOT EXISTS dim_date (
    order_date  TEXT PRIMARY KEY,
    year        INTEGER NOT NULL,
    quarter     TEXT NOT NULL,
    month       INTEGER NOT NULL,
    month_name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_geography (
    region   TEXT NOT NULL,
    country  TEXT NOT NULL,
    PRIMARY KEY (region, country)
);

CREATE TABLE IF NOT EXISTS dim_product (
    category     TEXT NOT NULL,
    subcategory  TEXT NOT NULL,
    PRIMARY KEY (category, subcategory)
);

CREATE TABLE IF NOT EXISTS dim_customer (
    customer_segment TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS fact_sales (
    order_id          TEXT PRIMARY KEY,
    order_date        TEXT NOT NULL,
    year              INTEGER NOT NULL,
    quarter           TEXT NOT NULL,
    month             INTEGER NOT NULL,
    month_name        TEXT NOT NULL,
    region            TEXT NOT NULL,
    country           TEXT NOT NULL,
    category          TEXT NOT NULL,
    subcategory       TEXT NOT NULL,
    customer_segment  TEXT NOT NULL,
    quantity          INTEGER NOT NULL,
    unit_price        REAL NOT NULL,
    revenue           REAL NOT NULL,
    cost              REAL NOT NULL,
    profit            REAL NOT NULL,
    profit_margin     REAL NOT NULL
);
";

/// Rebuilds the dimension tables from whatever is in `fact_sales`.
pub const REBUILD_DIMENSIONS: &str = "\
DELETE FROM dim_date;
DELETE FROM dim_geography;
DELETE FROM dim_product;
DELETE FROM dim_customer;
INSERT INTO dim_date
    SELECT DISTINCT order_date, year, quarter, month, month_name
    FROM fact_sales ORDER BY order_date;
INSERT INTO dim_geography
    SELECT DISTINCT region, country FROM fact_sales ORDER BY region, country;
INSERT INTO dim_product
    SELECT DISTINCT category, subcategory FROM fact_sales ORDER BY category, subcategory;
INSERT INTO dim_customer
    SELECT DISTINCT customer_segment FROM fact_sales ORDER BY customer_segment;
";

/// Compact description handed to the decision service so generated SQL
/// targets real columns.
pub const PROMPT_SCHEMA: &str = "\
Table: fact_sales (SQLite)
Columns: order_id, order_date (TEXT 'YYYY-MM-DD'), year (INTEGER 2022-2024), \
quarter (TEXT 'Q1'..'Q4'), month (INTEGER 1-12), month_name (TEXT, e.g. 'January'), \
region, country, category, subcategory, customer_segment, \
quantity (INTEGER), unit_price, revenue, cost, profit (REAL), profit_margin (REAL, percent)

Regions: North America, Europe, Asia Pacific, Latin America
Categories: Electronics, Furniture, Office Supplies, Clothing
Customer segments: Consumer, Corporate, Small Business, Government";
