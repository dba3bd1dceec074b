// Root of the bridge integration tests; the test modules live in tests/bridge/.

mod common;

mod bridge {
    mod auth_tests;
    mod events_tests;
    mod handlers_tests;
}
