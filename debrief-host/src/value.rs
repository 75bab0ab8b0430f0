//! ホスト環境の動的値型

use serde::{Deserialize, Serialize};
use std::fmt;

/// ホスト環境を流れる動的型の値
///
/// 呼び出しの引数・戻り値、変数の内容、イベントのペイロードを
/// 統一的に表現します。引数リストは `List` として渡されます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 値なし
    Nil,
    /// 真偽値
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮動小数点数
    Float(f64),
    /// 文字列
    Str(String),
    /// 値のリスト
    List(Vec<Value>),
}

impl Value {
    /// 真偽値かどうか
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// スライスをリスト値に変換する
    pub fn list(items: &[Value]) -> Self {
        Value::List(items.to_vec())
    }

    /// リテラル文字列から値を組み立てる
    ///
    /// `nil`・真偽値・整数・浮動小数点数の順に解釈を試み、どれでも
    /// なければ文字列として扱います。
    pub fn parse_literal(s: &str) -> Value {
        match s {
            "nil" => Value::Nil,
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                if let Ok(n) = s.parse::<i64>() {
                    Value::Int(n)
                } else if let Ok(x) = s.parse::<f64>() {
                    Value::Float(x)
                } else {
                    Value::Str(s.to_string())
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
