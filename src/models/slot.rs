/// A bookable service offered by the reservation site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Plan {
    pub id: u32,
    pub label: String,
}

impl Plan {
    pub fn new(id: u32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    /// Stand-in used when an allow-listed id is missing from the parsed catalog.
    pub fn synthetic(id: u32) -> Self {
        Self::new(id, format!("Plan {}", id))
    }
}

/// An open date for one plan. `key` is `"<plan_id>|<date>"` and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub plan_id: u32,
    pub plan_label: String,
    pub date: String,
    pub key: String,
}

impl Slot {
    pub fn new(plan: &Plan, date: impl Into<String>) -> Self {
        let date = date.into();
        Self {
            plan_id: plan.id,
            plan_label: plan.label.clone(),
            key: Self::key_for(plan.id, &date),
            date,
        }
    }

    pub fn key_for(plan_id: u32, date: &str) -> String {
        format!("{}|{}", plan_id, date)
    }
}
