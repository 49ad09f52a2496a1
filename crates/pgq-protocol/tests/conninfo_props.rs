//! Property tests for connection string parsing.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use pgq_protocol::ConnParams;
use proptest::prelude::*;

fn percent_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn parse_never_panics(input in ".{0,128}") {
        let _ = ConnParams::parse(&input);
    }

    #[test]
    fn rendered_values_survive_reparse(
        dbname in "[a-z][a-z0-9_]{0,15}",
        password in "[ -~]{0,24}",
    ) {
        let mut params = ConnParams::default();
        params.set("dbname", dbname).unwrap();
        params.set("password", password).unwrap();

        let reparsed = ConnParams::parse(&params.to_conninfo()).unwrap();
        prop_assert_eq!(reparsed, params);
    }

    #[test]
    fn uri_components_map_to_keywords(
        user in "[a-z][a-z0-9_]{0,11}",
        password in "[ -~]{1,16}",
        host in "[a-z][a-z0-9-]{0,15}",
        port in 1u16..,
        dbname in "[a-z0-9 _][ -~]{0,15}",
        application_name in "[ -~]{0,16}",
    ) {
        let uri = format!(
            "postgresql://{user}:{}@{host}:{port}/{}?application_name={}",
            percent_encode(&password),
            percent_encode(&dbname),
            percent_encode(&application_name),
        );
        let params = ConnParams::parse(&uri).unwrap();
        prop_assert_eq!(params.user.as_deref(), Some(user.as_str()));
        prop_assert_eq!(params.password.as_deref(), Some(password.as_str()));
        prop_assert_eq!(params.host.as_deref(), Some(host.as_str()));
        prop_assert_eq!(params.port, Some(port));
        prop_assert_eq!(params.dbname.as_deref(), Some(dbname.as_str()));
        prop_assert_eq!(params.application_name.as_deref(), Some(application_name.as_str()));

        let reparsed = ConnParams::parse(&params.to_conninfo()).unwrap();
        prop_assert_eq!(reparsed, params);
    }
}
