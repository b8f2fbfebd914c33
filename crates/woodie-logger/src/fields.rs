use arc_swap::ArcSwap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 结构化字段
pub type Fields = BTreeMap<String, Value>;

/// 构造 [`Fields`]，值经 `serde_json::json!` 转换
///
/// ```
/// let fields = woodie_logger::fields! { "env" => "prod", "pid" => 123 };
/// assert_eq!(fields["pid"], 123);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(
            fields.insert(
                ::std::string::String::from($key),
                $crate::__serde_json::json!($value),
            );
        )+
        fields
    }};
}

/// 依次合并多层字段，后者覆盖前者
pub fn merge_fields<'a>(layers: impl IntoIterator<Item = &'a Fields>) -> Fields {
    let mut merged = Fields::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// 持久字段存储
///
/// 每次更新生成新的不可变快照并原子替换，读者拿到的总是完整快照。
pub struct FieldStore {
    current: ArcSwap<Fields>,
}

impl FieldStore {
    pub fn new(initial: Fields) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<Fields> {
        self.current.load_full()
    }

    /// 合并新字段，同名键后写者胜出
    pub fn extend(&self, fields: Fields) {
        if fields.is_empty() {
            return;
        }

        self.current.rcu(|current| {
            let mut next = Fields::clone(current);
            next.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            next
        });
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for FieldStore {
    fn default() -> Self {
        Self::new(Fields::new())
    }
}
