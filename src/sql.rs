use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: Ulid,
        name: String,
    },
    InsertRoom {
        id: Ulid,
        number: String,
        hotel_id: Option<Ulid>,
    },
    /// Fields left out or given as NULL stay `None` and are reported by the
    /// validator, not the parser.
    InsertBooking {
        params: NewBookingParams,
        returning: bool,
    },
    /// `DELETE FROM bookings` cancels; the row stays listed as canceled.
    CancelBooking {
        id: Ulid,
    },
    SelectBookings {
        filter: BookingFilter,
    },
    SelectRooms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    Id(BookingId),
    User(UserId),
}

const USER_COLUMNS: &[&str] = &["id", "name"];
const ROOM_COLUMNS: &[&str] = &["id", "number", "hotel_id"];
const BOOKING_COLUMNS: &[&str] = &["user_id", "room_id", "from_date", "till_date"];

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
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "users" => {
            let row = InsertRow::new("users", USER_COLUMNS, insert, &values)?;
            Ok(Command::InsertUser {
                id: parse_ulid_expr(row.require("id")?)?,
                name: parse_string_expr(row.require("name")?)?,
            })
        }
        "rooms" => {
            let row = InsertRow::new("rooms", ROOM_COLUMNS, insert, &values)?;
            Ok(Command::InsertRoom {
                id: parse_ulid_expr(row.require("id")?)?,
                number: parse_string_expr(row.require("number")?)?,
                hotel_id: row.get("hotel_id").map(parse_ulid_or_null).transpose()?.flatten(),
            })
        }
        "bookings" => {
            let row = InsertRow::new("bookings", BOOKING_COLUMNS, insert, &values)?;
            let params = NewBookingParams {
                user_id: row.get("user_id").map(parse_ulid_or_null).transpose()?.flatten(),
                room_id: row.get("room_id").map(parse_ulid_or_null).transpose()?.flatten(),
                from_date: row.get("from_date").map(parse_i64_or_null).transpose()?.flatten(),
                till_date: row.get("till_date").map(parse_i64_or_null).transpose()?.flatten(),
            };
            Ok(Command::InsertBooking {
                params,
                returning: insert.returning.is_some(),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Values of a single-row INSERT, addressed by column name. Without a column
/// list the values are taken in the table's declared column order.
struct InsertRow<'a> {
    table: &'static str,
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> InsertRow<'a> {
    fn new(
        table: &'static str,
        known: &[&str],
        insert: &ast::Insert,
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let columns: Vec<String> = if insert.columns.is_empty() {
            known.iter().map(|c| c.to_string()).collect()
        } else {
            insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
        };
        if let Some(unknown) = columns.iter().find(|c| !known.contains(&c.as_str())) {
            return Err(SqlError::UnknownColumn(unknown.clone()));
        }
        if values.len() > columns.len() {
            return Err(SqlError::WrongArity(table, columns.len(), values.len()));
        }
        Ok(Self { table, columns, values })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(self.table, column))
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "bookings" => Ok(Command::CancelBooking { id }),
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

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms),
        "bookings" => {
            let filter = match &select.selection {
                None => BookingFilter::All,
                Some(selection) => booking_filter(selection)?,
            };
            Ok(Command::SelectBookings { filter })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn booking_filter(expr: &Expr) -> Result<BookingFilter, SqlError> {
    if let Expr::BinaryOp {
        left,
        op: ast::BinaryOperator::Eq,
        right,
    } = expr
    {
        match expr_column_name(left).as_deref() {
            Some("id") => return Ok(BookingFilter::Id(parse_ulid_expr(right)?)),
            Some("user_id") => return Ok(BookingFilter::User(parse_ulid_expr(right)?)),
            _ => {}
        }
    }
    Err(SqlError::Unsupported(format!("bookings filter: {expr}")))
}

// ── Helpers ───────────────────────────────────────────────────

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

/// First VALUES row. Multi-row inserts are rejected.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
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
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
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

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_ulid_expr(expr).map(Some),
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(n, _)) => Ok(n.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad timestamp {s:?}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        parse_i64_expr(expr)?
            .checked_neg()
            .ok_or_else(|| SqlError::Parse("timestamp out of range".into()))
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_i64_expr(expr).map(Some),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str, &'static str),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing value for {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const R: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    #[test]
    fn parse_insert_user() {
        let cmd = parse_sql(&format!("INSERT INTO users (id, name) VALUES ('{U}', 'Alice')")).unwrap();
        assert_eq!(
            cmd,
            Command::InsertUser {
                id: Ulid::from_string(U).unwrap(),
                name: "Alice".into()
            }
        );
    }

    #[test]
    fn parse_insert_room_with_and_without_hotel() {
        let cmd = parse_sql(&format!("INSERT INTO rooms (id, number) VALUES ('{R}', '101')")).unwrap();
        match cmd {
            Command::InsertRoom { number, hotel_id, .. } => {
                assert_eq!(number, "101");
                assert_eq!(hotel_id, None);
            }
            _ => panic!("expected InsertRoom, got {cmd:?}"),
        }

        let sql = format!("INSERT INTO rooms (id, number, hotel_id) VALUES ('{R}', 12, '{U}')");
        match parse_sql(&sql).unwrap() {
            Command::InsertRoom { number, hotel_id, .. } => {
                assert_eq!(number, "12");
                assert_eq!(hotel_id.unwrap().to_string(), U);
            }
            other => panic!("expected InsertRoom, got {other:?}"),
        }
    }

    #[test]
    fn user_and_room_values_follow_the_column_list() {
        let sql = format!("INSERT INTO rooms (hotel_id, number, id) VALUES ('{U}', '12', '{R}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertRoom {
                id: Ulid::from_string(R).unwrap(),
                number: "12".into(),
                hotel_id: Some(Ulid::from_string(U).unwrap()),
            }
        );

        let sql = format!("INSERT INTO users (name, id) VALUES ('Alice', '{U}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertUser {
                id: Ulid::from_string(U).unwrap(),
                name: "Alice".into()
            }
        );
    }

    #[test]
    fn user_and_room_column_mismatches_rejected() {
        let sql = format!("INSERT INTO users (id, name) VALUES ('{U}', 'Alice', 'extra')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("users", 2, 3))));

        let sql = format!("INSERT INTO rooms VALUES ('{R}', '12', NULL, 'extra')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("rooms", 3, 4))));

        let sql = format!("INSERT INTO users (id, email) VALUES ('{U}', 'a@b.c')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "email"));

        let sql = format!("INSERT INTO rooms (id, hotel_id) VALUES ('{R}', '{U}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("rooms", "number"))));
    }

    #[test]
    fn parse_insert_booking_positional() {
        let sql = format!(
            "INSERT INTO bookings VALUES ('{U}', '{R}', 1736467200000, 1736640000000) RETURNING id"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertBooking {
                params: NewBookingParams::new(
                    Ulid::from_string(U).unwrap(),
                    Ulid::from_string(R).unwrap(),
                    1_736_467_200_000,
                    1_736_640_000_000
                ),
                returning: true,
            }
        );
    }

    #[test]
    fn parse_insert_booking_by_column_name() {
        let sql = format!(
            "INSERT INTO bookings (from_date, till_date, room_id, user_id) VALUES (10, 20, '{R}', '{U}')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { params, returning } => {
                assert!(!returning);
                assert_eq!(params.from_date, Some(10));
                assert_eq!(params.till_date, Some(20));
                assert_eq!(params.room_id.unwrap().to_string(), R);
                assert_eq!(params.user_id.unwrap().to_string(), U);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn omitted_and_null_booking_fields_stay_empty() {
        let sql = format!("INSERT INTO bookings (user_id, room_id, from_date) VALUES ('{U}', NULL, 5)");
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { params, .. } => {
                assert!(params.user_id.is_some());
                assert_eq!(params.room_id, None);
                assert_eq!(params.from_date, Some(5));
                assert_eq!(params.till_date, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn negative_timestamp_parses() {
        let sql = format!("INSERT INTO bookings VALUES ('{U}', '{R}', -5, 10)");
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { params, .. } => assert_eq!(params.from_date, Some(-5)),
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn unknown_booking_column_rejected() {
        let sql = format!("INSERT INTO bookings (user_id, status) VALUES ('{U}', 'confirmed')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "status"));
    }

    #[test]
    fn malformed_ulid_is_parse_error() {
        let sql = "INSERT INTO bookings VALUES ('nope', NULL, 1, 2)";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn multi_row_insert_rejected() {
        let sql = format!("INSERT INTO users (id, name) VALUES ('{U}', 'a'), ('{R}', 'b')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn delete_booking_is_cancel() {
        let cmd = parse_sql(&format!("DELETE FROM bookings WHERE id = '{U}'")).unwrap();
        assert_eq!(cmd, Command::CancelBooking { id: Ulid::from_string(U).unwrap() });
    }

    #[test]
    fn delete_without_id_rejected() {
        assert!(matches!(
            parse_sql("DELETE FROM bookings"),
            Err(SqlError::MissingFilter("id"))
        ));
        assert!(matches!(
            parse_sql(&format!("DELETE FROM rooms WHERE id = '{U}'")),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn select_filters() {
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::SelectBookings { filter: BookingFilter::All }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM bookings WHERE user_id = '{U}'")).unwrap(),
            Command::SelectBookings {
                filter: BookingFilter::User(Ulid::from_string(U).unwrap())
            }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM bookings WHERE id = '{R}'")).unwrap(),
            Command::SelectBookings {
                filter: BookingFilter::Id(Ulid::from_string(R).unwrap())
            }
        );
        assert_eq!(parse_sql("select * from ROOMS").unwrap(), Command::SelectRooms);
    }

    #[test]
    fn unsupported_statements() {
        assert!(matches!(parse_sql("SELECT * FROM hotels"), Err(SqlError::UnknownTable(_))));
        assert!(matches!(parse_sql("CREATE TABLE x (a INT)"), Err(SqlError::Unsupported(_))));
        assert!(matches!(
            parse_sql("SELECT * FROM bookings WHERE from_date > 5"),
            Err(SqlError::Unsupported(_))
        ));
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
        assert!(matches!(parse_sql("SELEC nonsense"), Err(SqlError::Parse(_))));
    }
}
