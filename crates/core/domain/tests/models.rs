use domain::{
    BaseEvent, DataPoint, EndpointKind, EndpointState, EventType, PointAddress, RuleAction,
    RuleConfig,
};

#[test]
fn point_row_parses_from_sheet_json() {
    let json = r#"{
        "deviceUuid": "DEVICE1",
        "tag": "temp_1",
        "alias": "温度",
        "frequency": 1000,
        "address": {"protocol": "MODBUS", "function": 3, "slaverId": 1, "address": 0, "quantity": 1},
        "dataType": "INT16",
        "dataOrder": "AB",
        "weight": 0
    }"#;
    let point: DataPoint = serde_json::from_str(json).expect("point");
    assert!(point.is_new());
    assert_eq!(
        point.address,
        PointAddress::Modbus {
            function: Some(3),
            slaver_id: Some(1),
            address: Some(0),
            quantity: Some(1),
        }
    );
    let point = point.with_default_weight();
    assert_eq!(point.weight, Some(1.0));
}

#[test]
fn rule_references_cover_sources_devices_and_targets() {
    let mut rule = RuleConfig::new("forward");
    rule.from_device.push("DEVICE1".to_string());
    rule.actions.push(RuleAction::DataToTarget {
        target: "OUTEND1".to_string(),
    });

    assert!(rule.references("DEVICE1"));
    assert!(rule.references("OUTEND1"));
    assert!(!rule.references("INEND9"));
    assert!(rule.listens_to("DEVICE1"));
    assert!(!rule.listens_to("OUTEND1"));
}

#[test]
fn down_event_names_kind_and_error() {
    let event = BaseEvent::endpoint_down(EndpointKind::Device, "DEVICE1", "plc", "timeout");
    assert_eq!(event.kind, EventType::Warning);
    assert_eq!(event.event, "event.device.down");
    assert!(event.info.contains("error message: timeout"));
}

#[test]
fn state_round_trips_through_atomic_code() {
    for state in [
        EndpointState::Stop,
        EndpointState::Up,
        EndpointState::Down,
        EndpointState::Pause,
    ] {
        assert_eq!(EndpointState::from_u8(state.as_u8()), state);
    }
}
