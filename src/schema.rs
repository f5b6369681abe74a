/// Declarative layout of the record store: collection names, their
/// secondary indexes, and the logical schema version the code expects.
///
/// Index `field` names refer to the camelCase keys inside the JSON body;
/// `column` is the SQL column the value is mirrored into so SQLite can
/// enforce uniqueness and serve lookups.
pub struct IndexSpec {
    pub field: &'static str,
    pub column: &'static str,
    pub unique: bool,
}

pub struct CollectionSpec {
    pub name: &'static str,
    pub indexes: &'static [IndexSpec],
}

impl CollectionSpec {
    pub fn index(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.field == field)
    }
}

pub const TEACHERS: CollectionSpec = CollectionSpec {
    name: "teachers",
    indexes: &[
        IndexSpec {
            field: "email",
            column: "email",
            unique: true,
        },
        IndexSpec {
            field: "personalCode",
            column: "personal_code",
            unique: true,
        },
    ],
};

pub const GRADES: CollectionSpec = CollectionSpec {
    name: "grades",
    indexes: &[IndexSpec {
        field: "name",
        column: "name",
        unique: true,
    }],
};

pub const MEAL_RECORDS: CollectionSpec = CollectionSpec {
    name: "meal_records",
    indexes: &[
        IndexSpec {
            field: "teacherId",
            column: "teacher_id",
            unique: false,
        },
        IndexSpec {
            field: "date",
            column: "date",
            unique: false,
        },
    ],
};

pub const STUDENT_ATTENDANCE: CollectionSpec = CollectionSpec {
    name: "student_attendance",
    indexes: &[
        IndexSpec {
            field: "teacherId",
            column: "teacher_id",
            unique: false,
        },
        IndexSpec {
            field: "date",
            column: "date",
            unique: false,
        },
    ],
};

pub const MENU_ENTRIES: CollectionSpec = CollectionSpec {
    name: "menu_entries",
    indexes: &[IndexSpec {
        field: "date",
        column: "date",
        unique: true,
    }],
};

pub const ALL: &[&CollectionSpec] = &[
    &TEACHERS,
    &GRADES,
    &MEAL_RECORDS,
    &STUDENT_ATTENDANCE,
    &MENU_ENTRIES,
];

/// Bumped whenever a migration is added. `PRAGMA user_version` of an
/// opened database trails this until the migrator has caught it up.
pub const SCHEMA_VERSION: u32 = 3;
