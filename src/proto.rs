//! Wire types and service stubs for `eventsdb.EventsDb`, generated from
//! `proto/eventsdb.proto` by `build.rs`.

tonic::include_proto!("eventsdb");

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_event_decodes_with_proto_field_tags() {
        // id=1 (7), type=3 ("t"), subject=4 ("s"), data=6 ([0x01])
        let wire = [0x08, 0x07, 0x1a, 0x01, b't', 0x22, 0x01, b's', 0x32, 0x01, 0x01];
        let event = Event::decode(&wire[..]).unwrap();
        assert_eq!(event.id, 7);
        assert_eq!(event.r#type, "t");
        assert_eq!(event.subject, "s");
        assert_eq!(event.data, vec![0x01]);
        assert!(event.source.is_empty());
    }

    #[test]
    fn test_stream_request_after_id_is_field_two() {
        let request = StreamEventsFromSubjectRequest {
            subject: "x".to_string(),
            after_id: 5,
        };
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x01, b'x', 0x10, 0x05]);
    }
}
