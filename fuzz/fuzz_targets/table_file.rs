#![no_main]

use libfuzzer_sys::fuzz_target;
use pktgate_engine::{GateConfig, TableFile, TableStore};

fuzz_target!(|data: &str| {
    let Ok(file) = TableFile::parse(data) else {
        return;
    };

    let config = GateConfig::default();
    let store = TableStore::new(config.limits, config.rule_order);
    let before = store.generation();
    match store.replace_all(file.into_table_set(0)) {
        Ok(generation) => {
            assert_eq!(generation, before + 1);
            // 게시된 테이블은 다시 내보내고 읽을 수 있어야 함
            let exported = TableFile::from_tables(&store.snapshot(), 0);
            let text = exported.to_toml().expect("published tables serialize");
            TableFile::parse(&text).expect("exported tables parse");
        }
        // 거부된 교체는 세대를 바꾸지 않음
        Err(_) => assert_eq!(store.generation(), before),
    }
});
