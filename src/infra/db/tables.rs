//! Postgres row mappings for the domain records.

use sqlx::{FromRow, postgres::PgRow};
use time::Date;

use crate::application::repos::{Entity, FieldValue};
use crate::domain::{Country, Currency, DailyAction, Game, WhiteLabel};

use super::statements::TableSpec;

/// An entity stored in one Postgres table.
pub trait TableEntity: Entity {
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin + Into<Self>;

    const TABLE: &'static str;
    const ID_COLUMN: &'static str = "id";
    /// Writable columns, in the order [`TableEntity::values`] yields them.
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<FieldValue>;

    fn spec() -> TableSpec {
        TableSpec {
            table: Self::TABLE,
            id_column: Self::ID_COLUMN,
            columns: Self::COLUMNS,
        }
    }
}

#[derive(FromRow)]
pub struct WhiteLabelRow {
    id: i64,
    name: String,
    code: String,
    is_active: bool,
}

impl From<WhiteLabelRow> for WhiteLabel {
    fn from(row: WhiteLabelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            code: row.code,
            is_active: row.is_active,
        }
    }
}

impl TableEntity for WhiteLabel {
    type Row = WhiteLabelRow;

    const TABLE: &'static str = "white_labels";
    const COLUMNS: &'static [&'static str] = &["name", "code", "is_active"];

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.name.as_str().into(),
            self.code.as_str().into(),
            self.is_active.into(),
        ]
    }
}

#[derive(FromRow)]
pub struct CountryRow {
    id: i64,
    name: String,
    iso_code: String,
    is_active: bool,
}

impl From<CountryRow> for Country {
    fn from(row: CountryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            iso_code: row.iso_code,
            is_active: row.is_active,
        }
    }
}

impl TableEntity for Country {
    type Row = CountryRow;

    const TABLE: &'static str = "countries";
    const COLUMNS: &'static [&'static str] = &["name", "iso_code", "is_active"];

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.name.as_str().into(),
            self.iso_code.as_str().into(),
            self.is_active.into(),
        ]
    }
}

#[derive(FromRow)]
pub struct CurrencyRow {
    id: i64,
    code: String,
    name: String,
    symbol: String,
}

impl From<CurrencyRow> for Currency {
    fn from(row: CurrencyRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            symbol: row.symbol,
        }
    }
}

impl TableEntity for Currency {
    type Row = CurrencyRow;

    const TABLE: &'static str = "currencies";
    const COLUMNS: &'static [&'static str] = &["code", "name", "symbol"];

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.code.as_str().into(),
            self.name.as_str().into(),
            self.symbol.as_str().into(),
        ]
    }
}

#[derive(FromRow)]
pub struct GameRow {
    id: i64,
    name: String,
    provider: String,
    game_type: String,
    is_active: bool,
}

impl From<GameRow> for Game {
    fn from(row: GameRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            provider: row.provider,
            game_type: row.game_type,
            is_active: row.is_active,
        }
    }
}

impl TableEntity for Game {
    type Row = GameRow;

    const TABLE: &'static str = "games";
    const COLUMNS: &'static [&'static str] = &["name", "provider", "game_type", "is_active"];

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.name.as_str().into(),
            self.provider.as_str().into(),
            self.game_type.as_str().into(),
            self.is_active.into(),
        ]
    }
}

#[derive(FromRow)]
pub struct DailyActionRow {
    id: i64,
    date: Date,
    white_label_id: i64,
    player_id: i64,
    registrations: i64,
    deposits: i64,
    bets: i64,
    wins: i64,
}

impl From<DailyActionRow> for DailyAction {
    fn from(row: DailyActionRow) -> Self {
        Self {
            id: row.id,
            date: row.date,
            white_label_id: row.white_label_id,
            player_id: row.player_id,
            registrations: row.registrations,
            deposits: row.deposits,
            bets: row.bets,
            wins: row.wins,
        }
    }
}

impl TableEntity for DailyAction {
    type Row = DailyActionRow;

    const TABLE: &'static str = "daily_actions";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "white_label_id",
        "player_id",
        "registrations",
        "deposits",
        "bets",
        "wins",
    ];

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.date.into(),
            self.white_label_id.into(),
            self.player_id.into(),
            self.registrations.into(),
            self.deposits.into(),
            self.bets.into(),
            self.wins.into(),
        ]
    }
}
