//! TCC status stream: a slew, an instrument change and a rotator slew

use super::TestDispatcher;
use std::time::Duration;

/// Actor the data sets are broadcast from
pub const ACTOR: &str = "tcc";

/// Initial state: BOSS on the telescope, tracking, rotator unavailable
pub fn init(test: &TestDispatcher<'_>) {
    test.dispatch(
        &["pointingInfo=3853, 11, A, 207.841, 35.3105, 15.0, 0.0, nan"],
        Some("platedb"),
    );
    test.dispatch(&["instrumentNum=10"], Some("mcp"));
    test.dispatch(
        &["guideState=on", "cartridgeLoaded=11, 3853, A, 1, 1"],
        Some("guider"),
    );
    test.dispatch(
        &[
            "Inst=BOSS",
            "IPConfig=FTF",
            "AxisCmdState=Tracking, Tracking, NotAvailable",
            "AxisErrCode='', '', NotAvailable",
            "AxePos=-340.009, 45, NaN",
            "AzStat=-340.009, 0.0, 4565, 0x801",
            "AltStat=45.0, 0.0, 4565, 0x801",
            "SecFocus=570",
            "GCFocus=-300",
            "scaleFac=1.00017",
        ],
        Some(ACTOR),
    );
}

/// The stream, one slice per message
pub const DATA_SET: &[&[&str]] = &[
    // stop buttons enabled
    &[
        "AxePos=-340.009, 45, NaN",
        "AzStat=-340.009, 0.0, 4565, 0",
        "AltStat=45.0, 0.0, 4565, 0",
    ],
    // slew
    &[
        "ObjName='test object with a long name'",
        "ObjSys=FK5, 2000.0",
        "ObjNetPos=120.123450, 0.000000, 4494436859.66000, -2.345670, 0.000000, 4494436859.66000",
        "RotType=None",
        "AxePos=-350.999, 45, NAN",
        "SlewDuration=14.0",
        "AxisCmdState=Slewing, Slewing, NotAvailable",
        "AxisErrCode='', '', NotAvailable",
        "AxePos=-340.009, 45, NaN",
        "SecFocus=570",
        "GCFocus=-300",
        "TCCPos=-342.999, 38.623, NaN",
    ],
    &["AxePos=-348.121, 43.432, NaN", "TCCPos=-342.999, 38.623, NaN"],
    &["AxePos=-346.329, 41.765, NaN", "TCCPos=-342.999, 38.623, NaN"],
    &["AxePos=-344.325, 39.424, NaN", "TCCPos=-342.999, 38.623, NaN"],
    &["AxePos=-343.012, 38.532, NaN", "TCCPos=-342.999, 38.623, NaN"],
    &["AxePos=-342.999, 38.623, NaN", "TCCPos=-342.999, 38.623, NaN"],
    // slew ends
    &[
        "SlewEnd",
        "AxisCmdState=Tracking, Tracking, NotAvailable",
        "AxisErrCode='','', NotAvailable",
        "AxePos=-342.974, 38.645, 10.0",
        "TCCPos=-342.974, 38.645, NaN",
    ],
    // tracking
    &[
        "AxisCmdState=Tracking, Tracking, NotAvailable",
        "AxisErrCode='','', NotAvailable",
        "AxePos=-342.964, 38.725, 10.0",
        "TCCPos=-342.964, 38.725, NaN",
    ],
    // instrument change to DIS, rotator back
    &[
        "Inst=DIS",
        "IPConfig=TTF",
        "SlewDuration=2.0",
        "AxisCmdState = Slewing, Slewing, Halting",
        "AxisErrCode='', '', NoRestart",
        "AzStat=-342.953, -0.011, 4565, 0",
        "AltStat=38.815, 0.10, 4565, 0",
        "RotStat=10.0, 0.0, 4565, 0",
        "AxePos=-342.563, 38.625, 10.0",
        "TCCPos=-342.563, 38.625, NaN",
    ],
    &[
        "SlewEnd",
        "AxisCmdState=Tracking, Tracking, Halted",
        "AxisErrCode='', '', NoRestart",
        "AxePos=-342.563, 38.625, 10.0",
        "TCCPos=-342.563, 38.625, NaN",
    ],
    // rotator slew
    &[
        "SlewDuration=6.0",
        "AxisCmdState=Slewing, Slewing, Slewing",
        "AxisErrCode='', '', ''",
        "RotType=Obj",
        "RotPos=3.456789, 0.000000, 4494436895.07921",
        "AxePos=-342.563, 38.625, 9.4",
        "TCCPos=-342.563, 38.625, 5.0",
    ],
    &["AxePos=-342.563, 38.625, 7.3", "TCCPos=-342.563, 38.625, 5.0"],
    &["AxePos=-342.563, 38.625, 6.1", "TCCPos=-342.563, 38.625, 5.0"],
    &["AxePos=-342.563, 38.625, 5.4", "TCCPos=-342.563, 38.625, 5.0"],
    &[
        "SlewEnd",
        "AxisCmdState=Tracking, Tracking, Tracking",
        "AxisErrCode='', '', ''",
        "AxePos=-342.563, 38.625, 5.0",
        "TCCPos=-342.563, 38.625, 5.0",
    ],
];

/// Replay the whole stream from the tcc actor
pub async fn run_test(test: &TestDispatcher<'_>, interval: Duration) {
    test.run_data_set(DATA_SET, interval).await;
}
