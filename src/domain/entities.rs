//! Reporting metadata and fact records.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::application::repos::{Activatable, Entity, FieldValue, Filter, Named};

/// Operator brand; most reports are partitioned by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteLabel {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub iso_code: String,
    pub is_active: bool,
}

/// Currencies are never deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub provider: String,
    pub game_type: String,
    pub is_active: bool,
}

/// Per-player, per-day activity totals. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAction {
    pub id: i64,
    pub date: Date,
    pub white_label_id: i64,
    pub player_id: i64,
    pub registrations: i64,
    pub deposits: i64,
    pub bets: i64,
    pub wins: i64,
}

fn active_only() -> Option<Filter> {
    Some(Filter::new().eq("is_active", true))
}

impl Entity for WhiteLabel {
    const TYPE_NAME: &'static str = "WhiteLabel";

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        match column {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "code" => Some(self.code.as_str().into()),
            "is_active" => Some(self.is_active.into()),
            _ => None,
        }
    }

    fn active_filter() -> Option<Filter> {
        active_only()
    }
}

impl Named for WhiteLabel {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Activatable for WhiteLabel {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Entity for Country {
    const TYPE_NAME: &'static str = "Country";

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        match column {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "iso_code" => Some(self.iso_code.as_str().into()),
            "is_active" => Some(self.is_active.into()),
            _ => None,
        }
    }

    fn active_filter() -> Option<Filter> {
        active_only()
    }
}

impl Named for Country {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Activatable for Country {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Entity for Currency {
    const TYPE_NAME: &'static str = "Currency";

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        match column {
            "id" => Some(self.id.into()),
            "code" => Some(self.code.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            "symbol" => Some(self.symbol.as_str().into()),
            _ => None,
        }
    }
}

impl Named for Currency {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Game {
    const TYPE_NAME: &'static str = "Game";

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        match column {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "provider" => Some(self.provider.as_str().into()),
            "game_type" => Some(self.game_type.as_str().into()),
            "is_active" => Some(self.is_active.into()),
            _ => None,
        }
    }

    fn active_filter() -> Option<Filter> {
        active_only()
    }
}

impl Named for Game {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Activatable for Game {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Entity for DailyAction {
    const TYPE_NAME: &'static str = "DailyAction";

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: &str) -> Option<FieldValue> {
        match column {
            "id" => Some(self.id.into()),
            "date" => Some(self.date.into()),
            "white_label_id" => Some(self.white_label_id.into()),
            "player_id" => Some(self.player_id.into()),
            "registrations" => Some(self.registrations.into()),
            "deposits" => Some(self.deposits.into()),
            "bets" => Some(self.bets.into()),
            "wins" => Some(self.wins.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn active_filter_excludes_inactive_rows() {
        let filter = WhiteLabel::active_filter().expect("white labels can be inactive");
        let mut label = WhiteLabel {
            id: 1,
            name: "Casino One".into(),
            code: "C1".into(),
            is_active: true,
        };
        assert!(filter.matches(&label));
        label.is_active = false;
        assert!(!filter.matches(&label));
        assert!(Currency::active_filter().is_none());
    }

    #[test]
    fn daily_action_exposes_its_date() {
        let row = DailyAction {
            id: 1,
            date: date!(2026 - 03 - 14),
            white_label_id: 2,
            player_id: 3,
            registrations: 0,
            deposits: 5_000,
            bets: 2_500,
            wins: 1_000,
        };
        assert!(Filter::new().eq("date", date!(2026 - 03 - 14)).matches(&row));
        assert!(!Filter::new().eq("date", date!(2026 - 03 - 15)).matches(&row));
    }
}
