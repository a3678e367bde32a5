mod common;

use std::io::Cursor;

use common::{request, Fixture};
use proptest::prelude::*;
use sealdrop_pipeline::{KeyMode, MemorySink};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn pipeline_roundtrip_any_data_any_chunk_size(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        chunk_size in 256u64..8192,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let restored = rt.block_on(async {
            let fx = Fixture::new(Some(chunk_size));
            let out = fx
                .pipeline
                .encrypt_and_upload(
                    Cursor::new(data.clone()),
                    data.len() as u64,
                    &request("prop.bin"),
                    &KeyMode::ZeroKnowledge,
                    None,
                )
                .await
                .unwrap();
            let mut sink = MemorySink::new();
            fx.pipeline.fetch_link(&out.link, None, &mut sink, None).await.unwrap();
            sink.into_bytes().unwrap()
        });
        prop_assert_eq!(restored, data);
    }
}
