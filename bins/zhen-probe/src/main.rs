//! zhen-probe - 码流探测工具
//!
//! 把 Annex B 基本流按指定方式切块后送入帧组装器, 输出组装统计与解析出的参数集.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use zhen::logging::{self, LoggingConfig};
use zhen_codec::constructor::{
    AnyFrameConstructor, Chunk, ChunkFlags, CodecFamily, ConstructorConfig, ConstructorState,
    create_constructor,
};
use zhen_codec::parsers::h265::HdrMetadata;
use zhen_codec::scanner::{AnnexBUnits, AvcSyntax, HevcSyntax, UnitSyntax};
use zhen_codec::BufferStats;

/// zhen 码流探测工具
#[derive(Parser, Debug)]
#[command(name = "zhen-probe", version, about = "H.264 / H.265 码流探测工具")]
struct Cli {
    /// 输入文件路径 (Annex B 基本流)
    input: PathBuf,

    /// 编码格式, 缺省时按扩展名推断
    #[arg(long, value_enum)]
    codec: Option<Codec>,

    /// 每个数据块的字节数
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,

    /// 按 NAL 单元切块 (忽略 --chunk-size)
    #[arg(long)]
    per_unit: bool,

    /// H.265: 找到 SPS/PPS 后不再等待 SEI
    #[arg(long)]
    no_wait: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,

    /// 日志级别, 设置了 RUST_LOG 时以 RUST_LOG 为准
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Codec {
    H264,
    H265,
    Passthrough,
}

impl Codec {
    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "h264" | "264" | "avc" | "jsv" => Some(Self::H264),
            "h265" | "265" | "hevc" | "bit" => Some(Self::H265),
            _ => None,
        }
    }

    fn family(self) -> CodecFamily {
        match self {
            Self::H264 => CodecFamily::Avc,
            Self::H265 => CodecFamily::Hevc,
            Self::Passthrough => CodecFamily::PassThrough,
        }
    }
}

// ============================================================
// 输出结构体
// ============================================================

#[derive(Serialize)]
struct ProbeOutput {
    filename: String,
    codec: CodecFamily,
    input_bytes: usize,
    chunks: u64,
    units: u64,
    consumed_bytes: u64,
    state: ConstructorState,
    eos: bool,
    buffer: BufferStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<SequenceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hdr: Option<HdrMetadata>,
}

#[derive(Serialize)]
struct SequenceInfo {
    sps_id: u32,
    width: u32,
    height: u32,
    profile_idc: u8,
    level_idc: u8,
    chroma_format_idc: u32,
    bit_depth_luma: u32,
    bit_depth_chroma: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_rate: Option<String>,
    sample_aspect_ratio: String,
}

/// 单次喂数据的统计
#[derive(Default)]
struct FeedTotals {
    chunks: u64,
    units: u64,
    consumed_bytes: u64,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    let cli = Cli::parse();
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    let log_config = LoggingConfig {
        level,
        ..LoggingConfig::default()
    };
    if let Err(e) = logging::init(&log_config) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let codec = cli
        .codec
        .or_else(|| Codec::from_extension(&cli.input))
        .with_context(|| {
            format!(
                "无法从文件名推断编码格式, 请使用 --codec 指定, path={}",
                cli.input.display()
            )
        })?;
    let data = std::fs::read(&cli.input)
        .with_context(|| format!("读取输入文件失败, path={}", cli.input.display()))?;

    if !cli.quiet {
        eprintln!(
            "zhen-probe 版本 {} -- {} 码流探测",
            zhen::version(),
            codec.family()
        );
        eprintln!("输入文件: {} ({} 字节)", cli.input.display(), data.len());
    }

    let config = ConstructorConfig {
        wait_for_supplemental: !cli.no_wait,
        ..ConstructorConfig::default()
    };
    let mut fc = create_constructor(codec.family(), config);
    let chunks = slice_input(&data, codec, cli.per_unit, cli.chunk_size)?;
    let totals = feed(&mut fc, &chunks)?;
    log::info!(
        "送入 {} 个数据块, 消费 {} 字节, 状态 {}",
        totals.chunks,
        totals.consumed_bytes,
        fc.state()
    );

    let output = ProbeOutput {
        filename: cli.input.display().to_string(),
        codec: fc.family(),
        input_bytes: data.len(),
        chunks: totals.chunks,
        units: totals.units,
        consumed_bytes: totals.consumed_bytes,
        state: fc.state(),
        eos: fc.was_eos_reached(),
        buffer: fc.stats(),
        sequence: sequence_info(&fc),
        hdr: Some(fc.hdr_metadata()).filter(|hdr| !hdr.is_empty()),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("序列化探测结果失败")?;
        println!("{json}");
    } else {
        print_text(&output);
    }
    Ok(())
}

/// 按 NAL 单元或固定大小切分输入
fn slice_input(data: &[u8], codec: Codec, per_unit: bool, chunk_size: usize) -> Result<Vec<&[u8]>> {
    if per_unit {
        let units: Vec<&[u8]> = match codec {
            Codec::H264 => AnnexBUnits::<AvcSyntax>::new(data).map(|u| u.bytes).collect(),
            Codec::H265 => AnnexBUnits::<HevcSyntax>::new(data).map(|u| u.bytes).collect(),
            Codec::Passthrough => vec![data],
        };
        return Ok(units);
    }
    anyhow::ensure!(chunk_size > 0, "--chunk-size 必须大于 0");
    Ok(data.chunks(chunk_size).collect())
}

/// 逐块送入帧组装器, 每轮只消费完整的单元
fn feed(fc: &mut AnyFrameConstructor, chunks: &[&[u8]]) -> Result<FeedTotals> {
    let mut totals = FeedTotals::default();
    for (index, &data) in chunks.iter().enumerate() {
        let last = index + 1 == chunks.len();
        let mut flags = ChunkFlags::empty();
        if fc.state() != ConstructorState::HeaderObtained {
            flags |= ChunkFlags::HEADER;
        }
        if last {
            flags |= ChunkFlags::END_OF_STREAM;
        }

        let family = fc.family();
        let mut cycle = fc
            .load(Chunk::new(data, index as u64, flags))
            .with_context(|| format!("载入第 {} 个数据块失败", index))?;
        let (bytes, units) = match cycle.assembled_buffer() {
            Some(buf) => complete_prefix(family, buf.unread(), last),
            None => (0, 0),
        };
        cycle.consume(bytes)?;
        cycle.unload().context("结束 load 周期失败")?;

        totals.chunks += 1;
        totals.units += units;
        totals.consumed_bytes += bytes as u64;
    }
    Ok(totals)
}

/// 可以整体消费的前缀: (字节数, 单元数)
///
/// 最后一个单元可能还不完整, 流结束前保留它.
fn complete_prefix(family: CodecFamily, unread: &[u8], eos: bool) -> (usize, u64) {
    fn split<S: UnitSyntax>(unread: &[u8], eos: bool) -> (usize, u64) {
        let offsets: Vec<usize> = AnnexBUnits::<S>::new(unread).map(|u| u.offset).collect();
        match (eos, offsets.last()) {
            (true, _) => (unread.len(), offsets.len() as u64),
            (false, Some(&last)) => (last, offsets.len() as u64 - 1),
            (false, None) => (0, 0),
        }
    }
    match family {
        CodecFamily::Avc => split::<AvcSyntax>(unread, eos),
        CodecFamily::Hevc => split::<HevcSyntax>(unread, eos),
        CodecFamily::PassThrough => (unread.len(), 1),
    }
}

fn sequence_info(fc: &AnyFrameConstructor) -> Option<SequenceInfo> {
    if let Some(sps) = fc.as_avc().and_then(|f| f.handler().active_sps()) {
        return Some(SequenceInfo {
            sps_id: sps.sps_id,
            width: sps.width,
            height: sps.height,
            profile_idc: sps.profile_idc,
            level_idc: sps.level_idc,
            chroma_format_idc: sps.chroma_format_idc,
            bit_depth_luma: sps.bit_depth_luma,
            bit_depth_chroma: sps.bit_depth_chroma,
            frame_rate: sps.fps().map(|r| r.to_string()),
            sample_aspect_ratio: sps.sar().to_string(),
        });
    }
    let sps = fc.as_hevc()?.handler().active_sps()?;
    Some(SequenceInfo {
        sps_id: sps.sps_id,
        width: sps.width,
        height: sps.height,
        profile_idc: sps.effective_profile_idc(),
        level_idc: sps.level_idc(),
        chroma_format_idc: sps.chroma_format_idc,
        bit_depth_luma: sps.bit_depth_luma,
        bit_depth_chroma: sps.bit_depth_chroma,
        frame_rate: sps.fps().map(|r| r.to_string()),
        sample_aspect_ratio: sps.sar().to_string(),
    })
}

fn print_text(output: &ProbeOutput) {
    println!("[STREAM]");
    println!("  文件名       : {}", output.filename);
    println!("  编码         : {}", output.codec);
    println!("  输入字节     : {}", output.input_bytes);
    println!("  数据块数     : {}", output.chunks);
    println!("  单元数       : {}", output.units);
    println!("  已消费字节   : {}", output.consumed_bytes);
    println!("  状态         : {}", output.state);
    println!("  流结束       : {}", output.eos);
    println!(
        "  缓冲区       : 重新分配 {} 次, 拷贝 {} 字节",
        output.buffer.reallocations, output.buffer.copied_bytes
    );
    println!("[/STREAM]");
    println!();

    if let Some(seq) = &output.sequence {
        println!("[SEQUENCE #{}]", seq.sps_id);
        println!("  分辨率       : {}x{}", seq.width, seq.height);
        println!("  profile      : {}", seq.profile_idc);
        println!("  level        : {}", seq.level_idc);
        println!("  色度格式     : {}", seq.chroma_format_idc);
        println!(
            "  位深         : 亮度 {} / 色度 {}",
            seq.bit_depth_luma, seq.bit_depth_chroma
        );
        if let Some(fr) = &seq.frame_rate {
            println!("  帧率         : {fr}");
        }
        println!("  SAR          : {}", seq.sample_aspect_ratio);
        println!("[/SEQUENCE]");
        println!();
    }

    if let Some(hdr) = &output.hdr {
        println!("[HDR]");
        if let Some(md) = &hdr.mastering_display {
            println!(
                "  母版亮度     : max={} min={} (0.0001 cd/m²)",
                md.max_luminance, md.min_luminance
            );
        }
        if let Some(cll) = &hdr.content_light_level {
            println!("  MaxCLL/FALL  : {}/{}", cll.max_cll, cll.max_fall);
        }
        println!("[/HDR]");
        println!();
    }
}
