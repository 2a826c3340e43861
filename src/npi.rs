use serde::Serialize;

use crate::constants::HOME_COUNTRY;
use crate::registry::{
    EnumerationType, NpiAddress, NpiBasic, NpiEndpoint, NpiIdentifier, NpiRecord, NpiTaxonomy,
    RegistryClient,
};

/// Flat display form of one registry record.
///
/// Every field is empty when `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub npi: String,
    pub enumeration_date: String,
    pub npi_type: String,
    pub status: String,
    pub provider_name: String,
    pub authorized_official: String,
    pub mailing_address: String,
    pub primary_practice_address: String,
    pub secondary_practice_addresses: String,
    pub health_information_exchange: String,
    pub other_identifiers: String,
    pub taxonomy: String,
    pub error: String,
}

impl LookupResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Self::default()
        }
    }

    /// Values for output columns 2 through 13, in header order.
    pub fn columns(&self) -> [&str; 12] {
        [
            self.npi.as_str(),
            self.enumeration_date.as_str(),
            self.npi_type.as_str(),
            self.status.as_str(),
            self.provider_name.as_str(),
            self.authorized_official.as_str(),
            self.mailing_address.as_str(),
            self.primary_practice_address.as_str(),
            self.secondary_practice_addresses.as_str(),
            self.health_information_exchange.as_str(),
            self.other_identifiers.as_str(),
            self.taxonomy.as_str(),
        ]
    }
}

/// Looks up one identifier and normalizes the answer. Never fails: lookup
/// problems are reported through `LookupResult::error`.
pub async fn lookup_npi(registry: &RegistryClient, npi: &str) -> LookupResult {
    match registry.fetch(npi).await {
        Ok(record) => normalize_record(&record),
        Err(err) => {
            tracing::warn!(npi = npi.trim(), "lookup failed: {err}");
            LookupResult::failed(err.to_string())
        }
    }
}

pub fn normalize_record(record: &NpiRecord) -> LookupResult {
    let basic = &record.basic;
    let enumeration_type = record.enumeration_type();

    let provider_name = match enumeration_type {
        EnumerationType::Organization => text(&basic.organization_name).to_string(),
        _ => individual_name(basic),
    };

    let mailing = first_with_purpose(&record.addresses, "MAILING");
    let location = first_with_purpose(&record.addresses, "LOCATION");

    LookupResult {
        npi: record.number_text(),
        enumeration_date: text(&basic.enumeration_date).to_string(),
        npi_type: enumeration_type.label().to_string(),
        status: text(&basic.status).to_string(),
        provider_name,
        authorized_official: authorized_official(basic).unwrap_or_default(),
        mailing_address: mailing.map(format_address).unwrap_or_default(),
        primary_practice_address: location.map(format_address).unwrap_or_default(),
        secondary_practice_addresses: record
            .practice_locations
            .iter()
            .map(format_address)
            .collect::<Vec<_>>()
            .join(" | "),
        health_information_exchange: join_entries(&record.endpoints, format_endpoint),
        other_identifiers: join_entries(&record.identifiers, format_identifier),
        taxonomy: record
            .taxonomies
            .iter()
            .map(format_taxonomy)
            .collect::<Vec<_>>()
            .join("; "),
        error: String::new(),
    }
}

pub fn format_address(addr: &NpiAddress) -> String {
    let mut parts = vec![
        text(&addr.address_1),
        text(&addr.address_2),
        text(&addr.city),
        text(&addr.state),
        text(&addr.postal_code),
    ];
    let country = text(&addr.country_name);
    if !country.is_empty() && country != HOME_COUNTRY {
        parts.push(country);
    }

    let mut out = join_present(&parts, ", ");
    let phone = text(&addr.telephone_number);
    if !phone.is_empty() {
        out.push_str(" | Phone: ");
        out.push_str(phone);
    }
    out
}

fn individual_name(basic: &NpiBasic) -> String {
    join_present(
        &[
            text(&basic.name_prefix),
            text(&basic.first_name),
            text(&basic.middle_name),
            text(&basic.last_name),
            text(&basic.name_suffix),
            text(&basic.credential),
        ],
        " ",
    )
}

fn authorized_official(basic: &NpiBasic) -> Option<String> {
    let first = text(&basic.authorized_official_first_name);
    let last = text(&basic.authorized_official_last_name);
    if first.is_empty() && last.is_empty() {
        return None;
    }

    let name = join_present(
        &[
            text(&basic.authorized_official_name_prefix),
            first,
            text(&basic.authorized_official_middle_name),
            last,
        ],
        " ",
    );
    let mut out = format!("Name: {name}");
    let title = text(&basic.authorized_official_title_or_position);
    if !title.is_empty() {
        out.push_str(&format!(" | Title: {title}"));
    }
    let phone = text(&basic.authorized_official_telephone_number);
    if !phone.is_empty() {
        out.push_str(&format!(" | Phone: {phone}"));
    }
    Some(out)
}

fn first_with_purpose<'a>(addresses: &'a [NpiAddress], purpose: &str) -> Option<&'a NpiAddress> {
    addresses
        .iter()
        .find(|a| text(&a.address_purpose) == purpose)
}

fn format_endpoint(ep: &NpiEndpoint) -> String {
    join_present(
        &[
            text(&ep.endpoint_type),
            text(&ep.endpoint),
            text(&ep.endpoint_description),
            text(&ep.endpoint_use),
            text(&ep.content_type),
            text(&ep.affiliation),
        ],
        " | ",
    )
}

fn format_identifier(ident: &NpiIdentifier) -> String {
    join_present(
        &[
            text(&ident.desc),
            text(&ident.identifier),
            text(&ident.state),
            text(&ident.issuer),
        ],
        " | ",
    )
}

fn format_taxonomy(tax: &NpiTaxonomy) -> String {
    let mut out = format!("{} [{}]", text(&tax.desc), text(&tax.code));
    if tax.primary.unwrap_or(false) {
        out.push_str(" (Primary)");
    }
    let state = text(&tax.state);
    if !state.is_empty() {
        out.push_str(&format!(" | State: {state}"));
    }
    let license = text(&tax.license);
    if !license.is_empty() {
        out.push_str(&format!(" | License: {license}"));
    }
    out
}

/// Formats each entry, drops the empty ones and joins the rest with `"; "`.
fn join_entries<T>(entries: &[T], format: impl Fn(&T) -> String) -> String {
    entries
        .iter()
        .map(format)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_present(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .copied()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}
