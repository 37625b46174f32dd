use rust_decimal::Decimal;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::BookingStatus;

/// Parsed command from SQL input.
///
/// Dates stay as the client sent them; the engine normalizes them in its
/// configured zone.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertHotel {
        id: Ulid,
        name: String,
        city: String,
    },
    InsertRoom {
        id: Ulid,
        hotel_id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    },
    UpdateRoom {
        id: Ulid,
        name: Option<String>,
        stock: u32,
        occupancy: u32,
        visible: bool,
    },
    DeleteRoom {
        id: Ulid,
    },
    InsertPricingPeriod(PeriodRow),
    /// Every row must name the same room.
    ReplacePricingPeriods {
        room_id: Ulid,
        periods: Vec<PeriodRow>,
    },
    DeletePricingPeriod {
        id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        room_id: Ulid,
        check_in: String,
        check_out: String,
        guest_name: String,
        guests: u32,
        coupon_code: Option<String>,
        room_count: u32,
    },
    DeleteBooking {
        id: Ulid,
    },
    SetBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    InsertCoupon(CouponRow),
    UpdateCoupon(CouponRow),
    DeleteCoupon {
        id: Ulid,
    },
    SelectAvailability {
        room_id: Ulid,
        check_in: String,
        check_out: String,
        rooms: u32,
    },
    SelectSearch {
        city: String,
        check_in: String,
        check_out: String,
        guests: u32,
    },
    SelectCouponCheck {
        code: String,
    },
    SelectBookingById {
        id: Ulid,
    },
    SelectBookingsByRoom {
        room_id: Ulid,
    },
    SelectHotels,
    SelectRooms {
        hotel_id: Option<Ulid>,
    },
    SelectPricingPeriods {
        room_id: Ulid,
    },
    SelectCoupons,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRow {
    pub id: Ulid,
    pub room_id: Ulid,
    pub start_date: String,
    pub end_date: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CouponRow {
    pub id: Ulid,
    pub code: String,
    pub discount: Decimal,
    pub usage_limit: u32,
    pub active: bool,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;

    if table == "room_pricing" {
        return parse_replace_periods(&rows);
    }
    let values = single_row(&table, &rows)?;

    match table.as_str() {
        "hotels" => {
            require(&table, values, 3)?;
            Ok(Command::InsertHotel {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                city: parse_string(&values[2])?,
            })
        }
        "rooms" => {
            require(&table, values, 5)?;
            let visible = match values.get(5) {
                Some(v) => parse_bool(v)?,
                None => true,
            };
            Ok(Command::InsertRoom {
                id: parse_ulid(&values[0])?,
                hotel_id: parse_ulid(&values[1])?,
                name: parse_string_or_null(&values[2])?,
                stock: parse_u32(&values[3])?,
                occupancy: parse_u32(&values[4])?,
                visible,
            })
        }
        "room_updates" => {
            require(&table, values, 5)?;
            Ok(Command::UpdateRoom {
                id: parse_ulid(&values[0])?,
                name: parse_string_or_null(&values[1])?,
                stock: parse_u32(&values[2])?,
                occupancy: parse_u32(&values[3])?,
                visible: parse_bool(&values[4])?,
            })
        }
        "pricing_periods" => Ok(Command::InsertPricingPeriod(parse_period_row(&table, values)?)),
        "bookings" => {
            require(&table, values, 6)?;
            let coupon_code = match values.get(6) {
                Some(v) => parse_string_or_null(v)?,
                None => None,
            };
            let room_count = match values.get(7) {
                Some(v) => parse_u32(v)?,
                None => 1,
            };
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                room_id: parse_ulid(&values[1])?,
                check_in: parse_string(&values[2])?,
                check_out: parse_string(&values[3])?,
                guest_name: parse_string(&values[4])?,
                guests: parse_u32(&values[5])?,
                coupon_code,
                room_count,
            })
        }
        "booking_status" => {
            require(&table, values, 2)?;
            let raw = parse_string(&values[1])?;
            let status = BookingStatus::parse(&raw).ok_or_else(|| SqlError::Parse(format!("unknown booking status: {raw}")))?;
            Ok(Command::SetBookingStatus {
                id: parse_ulid(&values[0])?,
                status,
            })
        }
        "coupons" => Ok(Command::InsertCoupon(parse_coupon_row(&table, values)?)),
        "coupon_updates" => Ok(Command::UpdateCoupon(parse_coupon_row(&table, values)?)),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_period_row(table: &str, values: &[Expr]) -> Result<PeriodRow, SqlError> {
    require(table, values, 5)?;
    Ok(PeriodRow {
        id: parse_ulid(&values[0])?,
        room_id: parse_ulid(&values[1])?,
        start_date: parse_string(&values[2])?,
        end_date: parse_string(&values[3])?,
        price: parse_decimal(&values[4])?,
    })
}

fn parse_coupon_row(table: &str, values: &[Expr]) -> Result<CouponRow, SqlError> {
    require(table, values, 4)?;
    let active = match values.get(4) {
        Some(v) => parse_bool(v)?,
        None => true,
    };
    Ok(CouponRow {
        id: parse_ulid(&values[0])?,
        code: parse_string(&values[1])?,
        discount: parse_decimal(&values[2])?,
        usage_limit: parse_u32(&values[3])?,
        active,
    })
}

fn parse_replace_periods(rows: &[Vec<Expr>]) -> Result<Command, SqlError> {
    let mut periods = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let period = parse_period_row("room_pricing row", row).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?;
        periods.push(period);
    }
    let room_id = periods[0].room_id;
    if periods.iter().any(|p| p.room_id != room_id) {
        return Err(SqlError::Parse("room_pricing rows must share one room_id".into()));
    }
    Ok(Command::ReplacePricingPeriods { room_id, periods })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "pricing_periods" => Ok(Command::DeletePricingPeriod { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        "coupons" => Ok(Command::DeleteCoupon { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }

    match table.as_str() {
        "availability" => Ok(Command::SelectAvailability {
            room_id: filters.ulid("room_id")?,
            check_in: filters.string("check_in")?,
            check_out: filters.string("check_out")?,
            rooms: filters.optional_u32("rooms")?.unwrap_or(1),
        }),
        "search" => Ok(Command::SelectSearch {
            city: filters.string("city")?,
            check_in: filters.string("check_in")?,
            check_out: filters.string("check_out")?,
            guests: filters.optional_u32("guests")?.unwrap_or(1),
        }),
        "coupon_check" => Ok(Command::SelectCouponCheck {
            code: filters.string("code")?,
        }),
        "bookings" => {
            if filters.has("id") {
                Ok(Command::SelectBookingById { id: filters.ulid("id")? })
            } else if filters.has("room_id") {
                Ok(Command::SelectBookingsByRoom { room_id: filters.ulid("room_id")? })
            } else {
                Err(SqlError::MissingFilter("id or room_id"))
            }
        }
        "hotels" => Ok(Command::SelectHotels),
        "rooms" => {
            let hotel_id = if filters.has("hotel_id") { Some(filters.ulid("hotel_id")?) } else { None };
            Ok(Command::SelectRooms { hotel_id })
        }
        "pricing_periods" => Ok(Command::SelectPricingPeriods {
            room_id: filters.ulid("room_id")?,
        }),
        "coupons" => Ok(Command::SelectCoupons),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col = value` terms of a WHERE clause joined by AND.
#[derive(Default)]
struct Filters {
    terms: Vec<(String, Expr)>,
}

impl Filters {
    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
                let col = expr_column_name(left).ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                self.terms.push((col, (**right).clone()));
                Ok(())
            }
            Expr::Nested(inner) => self.collect(inner),
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn has(&self, col: &str) -> bool {
        self.terms.iter().any(|(c, _)| c == col)
    }

    fn get(&self, col: &'static str) -> Result<&Expr, SqlError> {
        self.terms
            .iter()
            .find(|(c, _)| c == col)
            .map(|(_, e)| e)
            .ok_or(SqlError::MissingFilter(col))
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(self.get(col)?)
    }

    fn string(&self, col: &'static str) -> Result<String, SqlError> {
        parse_string(self.get(col)?)
    }

    fn optional_u32(&self, col: &'static str) -> Result<Option<u32>, SqlError> {
        if !self.has(col) {
            return Ok(None);
        }
        parse_u32(self.get(col)?).map(Some)
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn require(table: &str, values: &[Expr], min: usize) -> Result<(), SqlError> {
    if values.len() < min {
        return Err(SqlError::WrongArity(table.to_string(), min, values.len()));
    }
    Ok(())
}

fn single_row<'a>(table: &str, rows: &'a [Vec<Expr>]) -> Result<&'a [Expr], SqlError> {
    match rows {
        [row] => Ok(row),
        _ => Err(SqlError::Unsupported(format!("multi-row INSERT into {table}"))),
    }
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_decimal(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .trim()
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad decimal {s:?}: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected at least {1} values, got {2}")]
    WrongArity(String, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}
