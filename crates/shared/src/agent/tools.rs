#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    ListTables,
    Schema,
    Query,
    QueryChecker,
}

impl SqlTool {
    pub const ALL: [Self; 4] = [
        Self::Query,
        Self::Schema,
        Self::ListTables,
        Self::QueryChecker,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::ListTables => "sql_db_list_tables",
            Self::Schema => "sql_db_schema",
            Self::Query => "sql_db_query",
            Self::QueryChecker => "sql_db_query_checker",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            Self::Schema => {
                "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling sql_db_list_tables first! Example Input: table1, table2, table3"
            }
            Self::Query => {
                "Input to this tool is a detailed and correct SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check the query, and try again. If you encounter an issue with Unknown column 'xxxx' in 'field list', use sql_db_schema to query the correct table fields."
            }
            Self::QueryChecker => {
                "Use this tool to double check if your query is correct before executing it. Always use this tool before executing a query with sql_db_query!"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name.trim())
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.into_iter().map(Self::name).collect()
    }
}
