//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ターゲットを登録（`key=value` オプション付き）
    Register { id: String, opts: Vec<(String, String)> },
    /// ターゲットの登録を解除
    Unregister(String),
    /// ターゲットの有効状態を反転
    Toggle(String),
    /// グループをまとめて反転
    ToggleGroup(String),
    /// 登録済みターゲット一覧を表示
    List,
    /// 全ターゲットを照合し直す
    Refresh,
    /// グローバルスイッチの設定
    Global(bool),
    /// フック監視の全体有効フラグの設定
    Hooks(bool),
    /// スロット経由で関数を呼び出す
    Call { id: String, args: Vec<String> },
    /// 変数へ書き込む
    SetVar { id: String, value: String },
    /// 変数を読む
    GetVar(String),
    /// イベントをディスパッチする
    Fire { id: String, args: Vec<String> },
    /// スナップショットを保存
    Save,
    /// スナップショットを読み込み
    Load,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

/// `on` / `off` をパースする
fn parse_switch(s: &str) -> Option<bool> {
    match s {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// `key=value` の列をパースする（形式外のトークンは無視）
fn parse_opts(parts: &[&str]) -> Vec<(String, String)> {
    parts
        .iter()
        .filter_map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "register" | "reg" => {
                if parts.len() > 1 {
                    Some(Command::Register {
                        id: parts[1].to_string(),
                        opts: parse_opts(&parts[2..]),
                    })
                } else {
                    None
                }
            }
            "unregister" | "unreg" => parts.get(1).map(|id| Command::Unregister(id.to_string())),
            "toggle" | "t" => parts.get(1).map(|id| Command::Toggle(id.to_string())),
            "group" | "g" => parts.get(1).map(|g| Command::ToggleGroup(g.to_string())),
            "list" | "ls" => Some(Command::List),
            "refresh" | "r" => Some(Command::Refresh),
            "global" => parts.get(1).and_then(|s| parse_switch(s)).map(Command::Global),
            "hooks" => parts.get(1).and_then(|s| parse_switch(s)).map(Command::Hooks),
            "call" => {
                if parts.len() > 1 {
                    Some(Command::Call {
                        id: parts[1].to_string(),
                        args: parts[2..].iter().map(|s| s.to_string()).collect(),
                    })
                } else {
                    None
                }
            }
            "set" => {
                if parts.len() > 2 {
                    Some(Command::SetVar {
                        id: parts[1].to_string(),
                        value: parts[2..].join(" "),
                    })
                } else {
                    None
                }
            }
            "get" => parts.get(1).map(|id| Command::GetVar(id.to_string())),
            "fire" => {
                if parts.len() > 1 {
                    Some(Command::Fire {
                        id: parts[1].to_string(),
                        args: parts[2..].iter().map(|s| s.to_string()).collect(),
                    })
                } else {
                    None
                }
            }
            "save" => Some(Command::Save),
            "load" => Some(Command::Load),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("list"), Some(Command::List));
        assert_eq!(Command::parse("ls"), Some(Command::List));
        assert_eq!(Command::parse("toggle add"), Some(Command::Toggle("add".to_string())));
        assert_eq!(Command::parse("global on"), Some(Command::Global(true)));
        assert_eq!(Command::parse("hooks off"), Some(Command::Hooks(false)));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("global sideways"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_parse_register_opts() {
        let cmd = Command::parse("reg add kind=call advice=around timing=true").unwrap();
        assert_eq!(
            cmd,
            Command::Register {
                id: "add".to_string(),
                opts: vec![
                    ("kind".to_string(), "call".to_string()),
                    ("advice".to_string(), "around".to_string()),
                    ("timing".to_string(), "true".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_parse_call_args() {
        assert_eq!(
            Command::parse("call add 1 2"),
            Some(Command::Call {
                id: "add".to_string(),
                args: vec!["1".to_string(), "2".to_string()],
            })
        );
        assert_eq!(Command::parse("call"), None);
    }
}
