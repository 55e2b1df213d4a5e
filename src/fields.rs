//! Central field-mapping table: which Knack field carries which VESPA
//! category score for which cycle, plus the handful of cycle-independent
//! fields the pipeline reads. Semantic meaning lives here, not in the data.

use anyhow::{bail, Result};

use crate::model::Cycle;

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Vision,
    Effort,
    Systems,
    Practice,
    Attitude,
    Overall,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Vision,
        Category::Effort,
        Category::Systems,
        Category::Practice,
        Category::Attitude,
        Category::Overall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vision => "vision",
            Category::Effort => "effort",
            Category::Systems => "systems",
            Category::Practice => "practice",
            Category::Attitude => "attitude",
            Category::Overall => "overall",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Vision => "Vision",
            Category::Effort => "Effort",
            Category::Systems => "Systems",
            Category::Practice => "Practice",
            Category::Attitude => "Attitude",
            Category::Overall => "Overall",
        }
    }
}

// =============================================================================
// Per-cycle field sets
// =============================================================================

/// Field ids for one cycle's score columns and its free-text comment.
#[derive(Debug, Clone, Copy)]
pub struct CycleFields {
    pub vision: &'static str,
    pub effort: &'static str,
    pub systems: &'static str,
    pub practice: &'static str,
    pub attitude: &'static str,
    pub overall: &'static str,
    pub comment: &'static str,
}

const CYCLE_ONE: CycleFields = CycleFields {
    vision: "field_155",
    effort: "field_156",
    systems: "field_157",
    practice: "field_158",
    attitude: "field_159",
    overall: "field_160",
    comment: "field_2302",
};

const CYCLE_TWO: CycleFields = CycleFields {
    vision: "field_161",
    effort: "field_162",
    systems: "field_163",
    practice: "field_164",
    attitude: "field_165",
    overall: "field_166",
    comment: "field_2303",
};

const CYCLE_THREE: CycleFields = CycleFields {
    vision: "field_167",
    effort: "field_168",
    systems: "field_169",
    practice: "field_170",
    attitude: "field_171",
    overall: "field_172",
    comment: "field_2304",
};

pub fn for_cycle(cycle: Cycle) -> &'static CycleFields {
    match cycle {
        Cycle::One => &CYCLE_ONE,
        Cycle::Two => &CYCLE_TWO,
        Cycle::Three => &CYCLE_THREE,
    }
}

impl CycleFields {
    pub fn category_field(&self, category: Category) -> &'static str {
        match category {
            Category::Vision => self.vision,
            Category::Effort => self.effort,
            Category::Systems => self.systems,
            Category::Practice => self.practice,
            Category::Attitude => self.attitude,
            Category::Overall => self.overall,
        }
    }

    fn all(&self) -> [&'static str; 7] {
        [
            self.vision,
            self.effort,
            self.systems,
            self.practice,
            self.attitude,
            self.overall,
            self.comment,
        ]
    }
}

// =============================================================================
// Cycle-independent fields and role registry objects
// =============================================================================

pub const STUDENT_NAME_FIELD: &str = "field_187";
pub const STUDENT_FIRST_NAME_FIELD: &str = "field_187_first";
pub const STUDENT_LAST_NAME_FIELD: &str = "field_187_last";
pub const GROUP_FIELD: &str = "field_223";
pub const COURSE_FIELD: &str = "field_2299";
pub const YEAR_GROUP_FIELD: &str = "field_144";

pub const VESPA_RESULTS_OBJECT: &str = "object_10";
pub const STAFF_ADMIN_OBJECT: &str = "object_5";
pub const STAFF_ADMIN_EMAIL_FIELD: &str = "field_86";
pub const SUPER_USER_OBJECT: &str = "object_21";
pub const SUPER_USER_EMAIL_FIELD: &str = "field_473";

/// Load-time validation of the mapping table: every id well-formed, no
/// duplicates within a cycle. Catches editing slips before they surface as
/// silently-empty aggregates.
pub fn validate() -> Result<()> {
    for cycle in Cycle::ALL {
        let fields = for_cycle(cycle);
        let all = fields.all();
        for id in all {
            if !id.starts_with("field_") {
                bail!("malformed field id {:?} in cycle {} mapping", id, cycle.as_u8());
            }
        }
        for (i, a) in all.iter().enumerate() {
            if all[i + 1..].contains(a) {
                bail!("duplicate field id {:?} in cycle {} mapping", a, cycle.as_u8());
            }
        }
    }
    Ok(())
}
