/// Upstream series and taxonomy constants shared across the pipeline stages.

// KOSIS parameter-data endpoints. `apiKey`, `startPrdDe` and `endPrdDe` are
// rewritten per batch by the fetcher.
pub const POPULATION_URL_TEMPLATE: &str = "https://kosis.kr/openapi/Param/statisticsParameterData.do?method=getList&apiKey=&itmId=T10+&objL1=1+&objL2=1+2+&objL3=040+050+070+100+120+130+150+160+180+190+210+230+260+280+310+330+340+360+380+410+430+440+&objL4=&objL5=&objL6=&objL7=&objL8=&format=json&jsonVD=Y&prdSe=Y&startPrdDe=1999&endPrdDe=2023&orgId=101&tblId=DT_1BPA001";
pub const CANCER_URL_TEMPLATE: &str = "https://kosis.kr/openapi/Param/statisticsParameterData.do?method=getList&apiKey=&itmId=16117ac000101+&objL1=ALL&objL2=11101SSB21+11101SSB22+&objL3=15117AC001102+15117AC001103+15117AC001104+15117AC001105+15117AC001106+15117AC001107+15117AC001108+15117AC001109+15117AC001110+15117AC001111+15117AC001112+15117AC001113+15117AC001114+15117AC001115+15117AC001116+15117AC001117+15117AC001118+15117AC001119+15117AC001120+&objL4=&objL5=&objL6=&objL7=&objL8=&format=json&jsonVD=Y&prdSe=Y&startPrdDe=1999&endPrdDe=2023&orgId=117&tblId=DT_117N_A0024";

pub const PARAM_START_YEAR: &str = "startPrdDe";
pub const PARAM_END_YEAR: &str = "endPrdDe";
pub const PARAM_API_KEY: &str = "apiKey";

pub const DEFAULT_START_YEAR: i32 = 1999;
pub const DEFAULT_END_YEAR: i32 = 2023;
pub const BATCH_WIDTH_YEARS: i32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// Series names double as cache key prefixes: "population-1999-2023"
pub const POPULATION_SERIES: &str = "population";
pub const CANCER_SERIES: &str = "cancer";

/// Age code of the coarse 80-and-over stratum in the population table.
/// A cached population payload without it predates the gap-year fix.
pub const POPULATION_COARSE_80_PLUS_CODE: &str = "340";

pub const GAP_YEAR: i32 = 1999;

pub const AGE_80_84: &str = "80-84";
pub const AGE_85_PLUS: &str = "85+";
pub const AGE_80_PLUS: &str = "80+";
pub const ALL_AGES: &str = "ALL_AGES";

/// Elderly sub-strata that not every year reports; folded into `85+`.
pub const MERGED_INTO_85_PLUS: [&str; 4] = ["85-89", "90-94", "95-99", "100+"];

pub const RATE_MULTIPLIER: f64 = 100_000.0;
pub const DEFAULT_TOP_N: usize = 5;
pub const OTHER_LABEL: &str = "Other";

pub const FINAL_TABLE_FILE: &str = "cancer_incidence_final.csv";
pub const MISSING_JOINS_FILE: &str = "missing_joins.csv";
pub const MISSING_SUMMARY_FILE: &str = "missing_joins_summary.csv";

/// Cache key for a series over a year span.
pub fn cache_key(series: &str, start_year: i32, end_year: i32) -> String {
    format!("{}-{}-{}", series, start_year, end_year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_matches_logical_identifier() {
        assert_eq!(cache_key(POPULATION_SERIES, 1999, 2023), "population-1999-2023");
    }
}
