//! 名片消息 XML 解析
//!
//! 群聊中名片内容以 `"发送者id:\n"` 开头，后面才是真正的 XML 文档。
//! 只读取根元素上的 `username` / `nickname` / `alias` 属性。

use crate::ForwardResult;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// 名片信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub wxid: String,
    pub nickname: String,
    /// 微信号，可能为空
    pub alias: String,
}

/// 移除 `"<senderid>:\n"` 前缀
pub fn strip_sender_prefix(raw: &str) -> &str {
    let stripped = match raw.split_once(":\n") {
        Some((_, rest)) => rest.trim(),
        None => raw.trim(),
    };

    // 兜底：形如 "id:<msg ...>" 的残余前缀
    if let Some((prefix, rest)) = stripped.split_once(':')
        && !prefix.contains('<')
    {
        let rest = rest.trim();
        if rest.starts_with("<?xml") || rest.starts_with("<msg") {
            return rest;
        }
    }

    stripped
}

/// 解析名片 XML，任何解析失败或缺少必需字段都返回 None
pub fn parse_card(raw: &str) -> Option<Card> {
    let xml = strip_sender_prefix(raw);
    debug!(target: "Card", "开始解析名片XML: {}", preview(xml, 100));

    let root = match read_root_attributes(xml) {
        Ok(root) => root,
        Err(e) => {
            error!(target: "Card", "XML解析失败: {}", e);
            debug!(target: "Card", "失败的XML内容: {}", xml);
            return None;
        }
    };

    if root.wxid.is_empty() || root.nickname.is_empty() {
        warn!(
            target: "Card",
            "名片信息不完整: wxid={}, nickname={}",
            root.wxid,
            root.nickname
        );
        return None;
    }

    debug!(target: "Card", "解析名片信息成功: {:?}", root);
    Some(root)
}

/// 校验整份文档结构，返回根元素上的名片属性
fn read_root_attributes(xml: &str) -> ForwardResult<Card> {
    let mut reader = Reader::from_str(xml);
    let mut root: Option<Card> = None;
    let mut depth: usize = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    claim_root(&mut root, &e)?;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    claim_root(&mut root, &e)?;
                }
            }
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or("unmatched closing tag")?;
            }
            Event::Text(t) => {
                if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                    return Err("text outside of root element".into());
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err("CDATA outside of root element".into());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unclosed element at end of document".into());
    }
    root.ok_or_else(|| "no element found".into())
}

fn claim_root(root: &mut Option<Card>, e: &BytesStart) -> ForwardResult<()> {
    if root.is_some() {
        return Err("junk after document element".into());
    }

    let mut card = Card {
        wxid: String::new(),
        nickname: String::new(),
        alias: String::new(),
    };
    for attr in e.attributes() {
        let attr = attr?;
        let slot = match attr.key.as_ref() {
            b"username" => &mut card.wxid,
            b"nickname" => &mut card.nickname,
            b"alias" => &mut card.alias,
            _ => continue,
        };
        *slot = attr.unescape_value()?.into_owned();
    }

    *root = Some(card);
    Ok(())
}

fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
