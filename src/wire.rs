use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat,
    FieldInfo, QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::InnkeepAuthSource;
use crate::dates::format_night;
use crate::engine::{round_currency, BookingRequest, Engine, EngineError, CURRENCY_DP};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, PeriodRow, SqlError};
use crate::tenant::TenantManager;

pub struct InnkeepHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<InnkeepQueryParser>,
}

impl InnkeepHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(InnkeepQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, engine: &Engine, query: &str, format: Option<&Format>) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        format: Option<&Format>,
    ) -> PgWireResult<Response> {
        match cmd {
            Command::InsertHotel { id, name, city } => {
                engine.create_hotel(id, name, city).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::InsertRoom {
                id,
                hotel_id,
                name,
                stock,
                occupancy,
                visible,
            } => {
                engine
                    .create_room(id, hotel_id, name, stock, occupancy, visible)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::UpdateRoom {
                id,
                name,
                stock,
                occupancy,
                visible,
            } => {
                engine
                    .update_room(id, name, stock, occupancy, visible)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteRoom { id } => {
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(deleted())
            }
            Command::InsertPricingPeriod(row) => {
                let period = to_period(engine, row).map_err(engine_err)?;
                engine.add_pricing_period(period).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::ReplacePricingPeriods { room_id, periods } => {
                let count = periods.len();
                let periods = periods
                    .into_iter()
                    .map(|row| to_period(engine, row))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(engine_err)?;
                engine
                    .replace_pricing_periods(room_id, periods)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(count))
            }
            Command::DeletePricingPeriod { id } => {
                engine.remove_pricing_period(id).await.map_err(engine_err)?;
                Ok(deleted())
            }
            Command::InsertBooking {
                id,
                room_id,
                check_in,
                check_out,
                guest_name,
                guests,
                coupon_code,
                room_count,
            } => {
                let receipt = engine
                    .create_booking(BookingRequest {
                        id,
                        room_id,
                        check_in,
                        check_out,
                        guest_name,
                        guests,
                        room_count,
                        coupon_code,
                    })
                    .await
                    .map_err(engine_err)?;
                let schema = shaped(receipt_schema(), format);
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&receipt.id.to_string())?;
                encoder.encode_field(&money(receipt.total))?;
                encoder.encode_field(&receipt.status.to_string())?;
                Ok(rows_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(deleted())
            }
            Command::SetBookingStatus { id, status } => {
                engine.set_booking_status(id, status).await.map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::InsertCoupon(row) => {
                engine
                    .create_coupon(row.id, &row.code, row.discount, row.usage_limit, row.active)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted(1))
            }
            Command::UpdateCoupon(row) => {
                engine
                    .update_coupon(row.id, &row.code, row.discount, row.usage_limit, row.active)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteCoupon { id } => {
                engine.deactivate_coupon(id).await.map_err(engine_err)?;
                Ok(deleted())
            }
            Command::SelectAvailability {
                room_id,
                check_in,
                check_out,
                rooms,
            } => {
                let stay = engine
                    .normalize_stay(&check_in, &check_out)
                    .map_err(engine_err)?;
                let resolution = engine
                    .resolve_stay(room_id, stay, rooms)
                    .await
                    .map_err(engine_err)?;
                let schema = shaped(availability_schema(), format);
                let row = encode_resolution(&schema, &room_id.to_string(), &resolution);
                Ok(rows_response(schema, vec![row]))
            }
            Command::SelectSearch {
                city,
                check_in,
                check_out,
                guests,
            } => {
                let offers = engine
                    .search(&city, &check_in, &check_out, guests)
                    .await
                    .map_err(engine_err)?;
                let schema = shaped(search_schema(), format);
                let mut rows = Vec::new();
                for hotel in &offers {
                    let hotel_id = hotel.hotel.id.to_string();
                    let lowest = hotel.lowest_nightly.map(money);
                    for offer in &hotel.rooms {
                        rows.push(encode_offer(&schema, &hotel_id, hotel, lowest.as_deref(), offer));
                    }
                }
                Ok(rows_response(schema, rows))
            }
            Command::SelectCouponCheck { code } => {
                let check = engine.verify_coupon(&code).await.map_err(engine_err)?;
                let schema = shaped(coupon_check_schema(), format);
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&check.code)?;
                encoder.encode_field(&check.discount_percent.to_string())?;
                Ok(rows_response(schema, vec![Ok(encoder.take_row())]))
            }
            Command::SelectBookingById { id } => {
                let schema = shaped(bookings_schema(), format);
                let rows = engine
                    .get_booking(id)
                    .await
                    .iter()
                    .map(|b| encode_booking(&schema, b))
                    .collect();
                Ok(rows_response(schema, rows))
            }
            Command::SelectBookingsByRoom { room_id } => {
                let bookings = engine.list_bookings(room_id).await.map_err(engine_err)?;
                let schema = shaped(bookings_schema(), format);
                let rows = bookings.iter().map(|b| encode_booking(&schema, b)).collect();
                Ok(rows_response(schema, rows))
            }
            Command::SelectHotels => {
                let schema = shaped(hotels_schema(), format);
                let rows = engine
                    .list_hotels()
                    .into_iter()
                    .map(|h| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&h.id.to_string())?;
                        encoder.encode_field(&h.name)?;
                        encoder.encode_field(&h.city)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(rows_response(schema, rows))
            }
            Command::SelectRooms { hotel_id } => {
                let schema = shaped(rooms_schema(), format);
                let rows = engine
                    .list_rooms(hotel_id)
                    .await
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.hotel_id.to_string())?;
                        encoder.encode_field(&r.name)?;
                        encoder.encode_field(&i64::from(r.stock))?;
                        encoder.encode_field(&i64::from(r.occupancy))?;
                        encoder.encode_field(&r.visible)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(rows_response(schema, rows))
            }
            Command::SelectPricingPeriods { room_id } => {
                let periods = engine
                    .list_pricing_periods(room_id)
                    .await
                    .map_err(engine_err)?;
                let schema = shaped(pricing_periods_schema(), format);
                let rows = periods
                    .into_iter()
                    .map(|p| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&p.id.to_string())?;
                        encoder.encode_field(&p.room_id.to_string())?;
                        encoder.encode_field(&format_night(p.start))?;
                        encoder.encode_field(&format_night(p.end))?;
                        encoder.encode_field(&p.price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(rows_response(schema, rows))
            }
            Command::SelectCoupons => {
                let schema = shaped(coupons_schema(), format);
                let rows = engine
                    .list_coupons()
                    .await
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.id.to_string())?;
                        encoder.encode_field(&c.code)?;
                        encoder.encode_field(&c.discount_percent.to_string())?;
                        encoder.encode_field(&i64::from(c.usage_limit))?;
                        encoder.encode_field(&i64::from(c.used_count))?;
                        encoder.encode_field(&c.active)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(rows_response(schema, rows))
            }
        }
    }
}

fn to_period(engine: &Engine, row: PeriodRow) -> Result<PricingPeriod, EngineError> {
    Ok(PricingPeriod {
        id: row.id,
        room_id: row.room_id,
        start: engine.normalize_date(&row.start_date)?,
        end: engine.normalize_date(&row.end_date)?,
        price: row.price,
    })
}

/// Charged amounts always go out with two decimals.
fn money(value: Decimal) -> String {
    let mut rounded = round_currency(value);
    rounded.rescale(CURRENCY_DP);
    rounded.to_string()
}

fn inserted(rows: usize) -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(rows))
}

fn deleted() -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(1))
}

fn rows_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_resolution(schema: &Arc<Vec<FieldInfo>>, room_id: &str, r: &Resolution) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&room_id.to_string())?;
    encoder.encode_field(&r.status.as_str().to_string())?;
    encoder.encode_field(&r.available_from.map(format_night))?;
    encoder.encode_field(&r.available_to.map(format_night))?;
    encoder.encode_field(&(r.nightly.len() as i64))?;
    encoder.encode_field(&money(r.total))?;
    encoder.encode_field(&i64::from(r.rooms_left))?;
    Ok(encoder.take_row())
}

fn encode_offer(
    schema: &Arc<Vec<FieldInfo>>,
    hotel_id: &str,
    hotel: &HotelOffers,
    lowest: Option<&str>,
    offer: &RoomOffer,
) -> PgWireResult<DataRow> {
    let r = &offer.resolution;
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&hotel_id.to_string())?;
    encoder.encode_field(&hotel.hotel.name)?;
    encoder.encode_field(&hotel.hotel.city)?;
    encoder.encode_field(&lowest.map(str::to_string))?;
    encoder.encode_field(&hotel.has_partial)?;
    encoder.encode_field(&offer.room_id.to_string())?;
    encoder.encode_field(&r.status.as_str().to_string())?;
    encoder.encode_field(&r.available_from.map(format_night))?;
    encoder.encode_field(&r.available_to.map(format_night))?;
    encoder.encode_field(&money(r.total))?;
    encoder.encode_field(&i64::from(r.rooms_left))?;
    Ok(encoder.take_row())
}

fn encode_booking(schema: &Arc<Vec<FieldInfo>>, b: &Booking) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&b.id.to_string())?;
    encoder.encode_field(&b.room_id.to_string())?;
    encoder.encode_field(&format_night(b.stay.check_in))?;
    encoder.encode_field(&format_night(b.stay.check_out))?;
    encoder.encode_field(&b.status.to_string())?;
    encoder.encode_field(&i64::from(b.room_count))?;
    encoder.encode_field(&i64::from(b.guests))?;
    encoder.encode_field(&b.guest_name)?;
    encoder.encode_field(&money(b.subtotal))?;
    encoder.encode_field(&money(b.discount))?;
    encoder.encode_field(&money(b.total))?;
    encoder.encode_field(&b.coupon_id.map(|id| id.to_string()))?;
    encoder.encode_field(&b.created_at)?;
    Ok(encoder.take_row())
}

// ── Result schemas ───────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int8(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn boolean(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

/// Apply the client's requested result formats (extended protocol only).
fn with_format(fields: Vec<FieldInfo>, format: Option<&Format>) -> Vec<FieldInfo> {
    let Some(format) = format else {
        return fields;
    };
    fields
        .into_iter()
        .enumerate()
        .map(|(i, f)| FieldInfo::new(f.name().to_string(), None, None, f.datatype().clone(), format.format_for(i)))
        .collect()
}

fn shaped(fields: Vec<FieldInfo>, format: Option<&Format>) -> Arc<Vec<FieldInfo>> {
    Arc::new(with_format(fields, format))
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text("room_id"),
        text("status"),
        text("available_from"),
        text("available_to"),
        int8("nights"),
        text("total"),
        int8("rooms_left"),
    ]
}

fn search_schema() -> Vec<FieldInfo> {
    vec![
        text("hotel_id"),
        text("hotel_name"),
        text("city"),
        text("lowest_nightly"),
        boolean("has_partial"),
        text("room_id"),
        text("status"),
        text("available_from"),
        text("available_to"),
        text("total"),
        int8("rooms_left"),
    ]
}

fn coupon_check_schema() -> Vec<FieldInfo> {
    vec![text("code"), text("discount")]
}

fn receipt_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("total"), text("status")]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("room_id"),
        text("check_in"),
        text("check_out"),
        text("status"),
        int8("room_count"),
        int8("guests"),
        text("guest_name"),
        text("subtotal"),
        text("discount"),
        text("total"),
        text("coupon_id"),
        int8("created_at"),
    ]
}

fn hotels_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name"), text("city")]
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("hotel_id"),
        text("name"),
        int8("stock"),
        int8("occupancy"),
        boolean("visible"),
    ]
}

fn pricing_periods_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("room_id"),
        text("start_date"),
        text("end_date"),
        text("price"),
    ]
}

fn coupons_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("code"),
        text("discount"),
        int8("usage_limit"),
        int8("used_count"),
        boolean("active"),
    ]
}

/// Result columns for a statement, judged from its leading keyword and the
/// table it targets. Placeholders are not bound yet, so the statement is not
/// parsed here.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let mut words = sql.split_whitespace().map(|w| w.to_ascii_lowercase());
    let Some(verb) = words.next() else {
        return vec![];
    };
    let table = words
        .skip_while(|w| w != "from" && w != "into")
        .nth(1)
        .map(|w| {
            w.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .to_string()
        });
    match (verb.as_str(), table.as_deref()) {
        ("insert", Some("bookings")) => receipt_schema(),
        ("select", Some("availability")) => availability_schema(),
        ("select", Some("search")) => search_schema(),
        ("select", Some("coupon_check")) => coupon_check_schema(),
        ("select", Some("bookings")) => bookings_schema(),
        ("select", Some("hotels")) => hotels_schema(),
        ("select", Some("rooms")) => rooms_schema(),
        ("select", Some("pricing_periods")) => pricing_periods_schema(),
        ("select", Some("coupons")) => coupons_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for InnkeepHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run(&engine, query, None).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct InnkeepQueryParser;

#[async_trait]
impl QueryParser for InnkeepQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(with_format(result_schema(stmt), column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for InnkeepHandler {
    type Statement = String;
    type QueryParser = InnkeepQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        self.run(&engine, &sql, Some(&portal.result_column_format)).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(with_format(
            result_schema(&target.statement.statement),
            Some(&target.result_column_format),
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if let Ok(n) = rest[..digits].parse::<usize>() {
            max = max.max(n);
        }
        rest = &rest[digits..];
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
/// Higher numbers go first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct InnkeepFactory {
    handler: Arc<InnkeepHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<InnkeepAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl InnkeepFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = InnkeepAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(InnkeepHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for InnkeepFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(socket: TcpStream, factory: InnkeepFactory) -> std::io::Result<()> {
    if let Ok(peer) = socket.peer_addr() {
        debug!(%peer, "serving connection");
    }
    pgwire::tokio::process_socket(socket, None, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
