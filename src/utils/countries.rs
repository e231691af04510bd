/// ICAO Doc 9303 3-letter country codes mapped to display names.
/// Covers the codes seen in circulating passports; not exhaustive. An
/// unmapped code is still usable (the caller falls back to the raw code),
/// it just fails the known-code plausibility check.
static COUNTRY_CODES: &[(&str, &str)] = &[
    ("AFG", "Afghanistan"),
    ("ALB", "Albania"),
    ("ARE", "United Arab Emirates"),
    ("ARG", "Argentina"),
    ("AUS", "Australia"),
    ("AUT", "Austria"),
    ("BEL", "Belgium"),
    ("BGD", "Bangladesh"),
    ("BGR", "Bulgaria"),
    ("BRA", "Brazil"),
    ("CAN", "Canada"),
    ("CHE", "Switzerland"),
    ("CHL", "Chile"),
    ("CHN", "China"),
    ("COL", "Colombia"),
    ("CZE", "Czechia"),
    ("DEU", "Germany"),
    ("D<<", "Germany"),
    ("DNK", "Denmark"),
    ("DZA", "Algeria"),
    ("EGY", "Egypt"),
    ("ESP", "Spain"),
    ("EST", "Estonia"),
    ("ETH", "Ethiopia"),
    ("FIN", "Finland"),
    ("FRA", "France"),
    ("GBR", "United Kingdom"),
    ("GEO", "Georgia"),
    ("GHA", "Ghana"),
    ("GRC", "Greece"),
    ("HKG", "Hong Kong"),
    ("HRV", "Croatia"),
    ("HUN", "Hungary"),
    ("IDN", "Indonesia"),
    ("IND", "India"),
    ("IRL", "Ireland"),
    ("IRN", "Iran"),
    ("IRQ", "Iraq"),
    ("ISL", "Iceland"),
    ("ISR", "Israel"),
    ("ITA", "Italy"),
    ("JAM", "Jamaica"),
    ("JOR", "Jordan"),
    ("JPN", "Japan"),
    ("KAZ", "Kazakhstan"),
    ("KEN", "Kenya"),
    ("KOR", "South Korea"),
    ("KWT", "Kuwait"),
    ("LBN", "Lebanon"),
    ("LKA", "Sri Lanka"),
    ("LTU", "Lithuania"),
    ("LUX", "Luxembourg"),
    ("LVA", "Latvia"),
    ("MAR", "Morocco"),
    ("MEX", "Mexico"),
    ("MYS", "Malaysia"),
    ("NGA", "Nigeria"),
    ("NLD", "Netherlands"),
    ("NOR", "Norway"),
    ("NPL", "Nepal"),
    ("NZL", "New Zealand"),
    ("PAK", "Pakistan"),
    ("PAN", "Panama"),
    ("PER", "Peru"),
    ("PHL", "Philippines"),
    ("POL", "Poland"),
    ("PRT", "Portugal"),
    ("QAT", "Qatar"),
    ("ROU", "Romania"),
    ("RUS", "Russia"),
    ("SAU", "Saudi Arabia"),
    ("SGP", "Singapore"),
    ("SRB", "Serbia"),
    ("SVK", "Slovakia"),
    ("SVN", "Slovenia"),
    ("SWE", "Sweden"),
    ("THA", "Thailand"),
    ("TUN", "Tunisia"),
    ("TUR", "Turkey"),
    ("TWN", "Taiwan"),
    ("UKR", "Ukraine"),
    ("USA", "United States"),
    ("VEN", "Venezuela"),
    ("VNM", "Vietnam"),
    ("ZAF", "South Africa"),
];

/// Resolve a 3-letter ICAO code to a display country name.
pub fn country_name(code: &str) -> Option<&'static str> {
    let code = code.trim().to_uppercase();
    COUNTRY_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Membership check used by the result validator.
pub fn is_known_code(code: &str) -> bool {
    country_name(code).is_some()
}
