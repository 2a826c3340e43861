pub const DEFAULT_NPI_API_BASE_URL: &str = "https://npiregistry.cms.hhs.gov/api/";
pub const DEFAULT_NPI_API_VERSION: &str = "2.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 300;

/// Country names equal to this are left out of formatted addresses.
pub const HOME_COUNTRY: &str = "United States";

pub const ALLOWED_UPLOAD_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];

/// Worksheet name given to CSV uploads in the output workbook.
pub const CSV_SHEET_NAME: &str = "Sheet1";

pub const BATCH_DOWNLOAD_NAME: &str = "NPI_List_Full_Data.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const OUTPUT_HEADERS: [&str; 13] = [
    "NPI",
    "NPI (Registry Confirmed)",
    "Enumeration Date",
    "NPI Type",
    "Status",
    "Provider Name",
    "Authorized Official Information",
    "Mailing Address",
    "Primary Practice Address",
    "Secondary Practice Address(es)",
    "Health Information Exchange",
    "Other Identifiers",
    "Taxonomy",
];
