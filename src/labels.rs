//! Chinese display labels written as the second header row of the output CSV.

const FIXED_LABELS: &[(&str, &str)] = &[
    ("Date", "日期"),
    ("Symbol", "股票代码"),
    ("Open", "开盘价"),
    ("High", "最高价"),
    ("Low", "最低价"),
    ("Close", "收盘价"),
    ("Volume", "成交量"),
    // trend
    ("SMA_5", "5日简单移动平均"),
    ("SMA_10", "10日简单移动平均"),
    ("SMA_20", "20日简单移动平均"),
    ("SMA_50", "50日简单移动平均"),
    ("EMA_5", "5日指数移动平均"),
    ("EMA_10", "10日指数移动平均"),
    ("EMA_20", "20日指数移动平均"),
    ("EMA_50", "50日指数移动平均"),
    ("DEMA_20", "20日双重指数移动平均"),
    ("TEMA_20", "20日三重指数移动平均"),
    ("KAMA_30", "30日自适应移动平均"),
    ("WMA_20", "20日加权移动平均"),
    ("MACD", "MACD主线"),
    ("MACD_Signal", "MACD信号线"),
    ("MACD_Histogram", "MACD柱状图"),
    ("MACDEXT", "MACD扩展"),
    ("MACDFIX", "MACD固定"),
    ("ADX_14", "14日平均趋向指数"),
    ("ADXR_14", "14日平均趋向指数评级"),
    ("APO", "价格震荡指标"),
    ("AROON_DOWN", "阿隆下降"),
    ("AROON_UP", "阿隆上升"),
    ("AROONOSC_14", "14日阿隆震荡指标"),
    ("DX_14", "14日方向运动指数"),
    ("MINUS_DI_14", "14日负向动态指标"),
    ("MINUS_DM_14", "14日负向动态动量"),
    ("PLUS_DI_14", "14日正向动态指标"),
    ("PLUS_DM_14", "14日正向动态动量"),
    ("PPO", "价格震荡百分比"),
    ("TRIX_30", "30日三重指数平滑移动平均"),
    // momentum
    ("RSI_14", "14日相对强弱指数"),
    ("CCI_14", "14日商品通道指数"),
    ("CMO_14", "14日钱德动量摆动指标"),
    ("MFI_14", "14日资金流量指数"),
    ("WILLR_14", "14日威廉指标"),
    ("ULTOSC", "终极摆动指标"),
    ("BOP", "平衡震荡指标"),
    ("MOM_10", "10日动量"),
    ("ROC_10", "10日变动率"),
    ("ROCP_10", "10日变动率百分比"),
    ("ROCR_10", "10日变动率比率"),
    ("ROCR100_10", "10日变动率比率100"),
    ("STOCH_K", "随机指标K值"),
    ("STOCH_D", "随机指标D值"),
    ("STOCHF_K", "快速随机指标K值"),
    ("STOCHF_D", "快速随机指标D值"),
    ("STOCHRSI_K", "随机RSI指标K值"),
    ("STOCHRSI_D", "随机RSI指标D值"),
    // volatility
    ("BB_Upper", "布林带上轨"),
    ("BB_Middle", "布林带中轨"),
    ("BB_Lower", "布林带下轨"),
    ("ATR_14", "14日平均真实波幅"),
    ("NATR_14", "14日归一化平均真实波幅"),
    ("TRANGE", "真实波幅"),
    ("RealizedVolatility_20", "20日已实现波动率"),
    ("NegativeSemiDeviation_20", "20日负半偏差"),
    ("ContinuousVolatility_20", "20日连续波动率"),
    ("PositiveSemiDeviation_20", "20日正半偏差"),
    ("Volatility_10", "10日波动率"),
    ("Volatility_30", "30日波动率"),
    ("Volatility_60", "60日波动率"),
    // volume
    ("OBV", "能量潮"),
    ("AD", "累积/派发线"),
    ("ADOSC", "累积/派发震荡指标"),
    // candlestick patterns
    ("CDL2CROWS", "两只乌鸦"),
    ("CDL3BLACKCROWS", "三只乌鸦"),
    ("CDL3INSIDE", "三内部上涨和下跌"),
    ("CDL3LINESTRIKE", "三线打击"),
    ("CDL3OUTSIDE", "三外部上涨和下跌"),
    ("CDL3STARSINSOUTH", "南方三星"),
    ("CDL3WHITESOLDIERS", "三白兵"),
    ("CDLABANDONEDBABY", "弃婴"),
    ("CDLADVANCEBLOCK", "大敌当前"),
    ("CDLBELTHOLD", "捉腰带线"),
    ("CDLBREAKAWAY", "脱离"),
    ("CDLCLOSINGMARUBOZU", "收盘缺影线"),
    ("CDLCONCEALBABYSWALL", "藏婴吞没"),
    ("CDLCOUNTERATTACK", "反击线"),
    ("CDLDARKCLOUDCOVER", "乌云压顶"),
    ("CDLDOJI", "十字"),
    ("CDLDOJISTAR", "十字星"),
    ("CDLDRAGONFLYDOJI", "蜻蜓十字"),
    ("CDLENGULFING", "吞噬模式"),
    ("CDLEVENINGDOJISTAR", "十字暮星"),
    ("CDLEVENINGSTAR", "暮星"),
    ("CDLGAPSIDESIDEWHITE", "向上跳空并列阳线"),
    ("CDLGRAVESTONEDOJI", "墓碑十字"),
    ("CDLHAMMER", "锤子线"),
    ("CDLHANGINGMAN", "上吊线"),
    ("CDLHARAMI", "母子线"),
    ("CDLHARAMICROSS", "十字孕线"),
    ("CDLHIGHWAVE", "风高浪大线"),
    ("CDLHIKKAKE", "陷阱"),
    ("CDLHIKKAKEMOD", "修正陷阱"),
    ("CDLHOMINGPIGEON", "家鸽"),
    ("CDLIDENTICAL3CROWS", "三胞胎乌鸦"),
    ("CDLINNECK", "颈内线"),
    ("CDLINVERTEDHAMMER", "倒锤子线"),
    ("CDLKICKING", "反冲形态"),
    ("CDLKICKINGBYLENGTH", "由较长缺影线决定的反冲形态"),
    ("CDLLADDERBOTTOM", "梯底"),
    ("CDLLONGLEGGEDDOJI", "长脚十字"),
    ("CDLLONGLINE", "长蜡烛线"),
    ("CDLMARUBOZU", "光头光脚/缺影线"),
    ("CDLMATCHINGLOW", "相同低价"),
    ("CDLMATHOLD", "铺垫"),
    ("CDLMORNINGDOJISTAR", "十字晨星"),
    ("CDLMORNINGSTAR", "晨星"),
    ("CDLONNECK", "颈上线"),
    ("CDLPIERCING", "刺穿形态"),
    ("CDLRICKSHAWMAN", "黄包车夫"),
    ("CDLRISEFALL3METHODS", "上升和下降三法"),
    ("CDLSEPARATINGLINES", "分离线"),
    ("CDLSHOOTINGSTAR", "射击之星"),
    ("CDLSHORTLINE", "短蜡烛线"),
    ("CDLSPINNINGTOP", "陀螺"),
    ("CDLSTALLEDPATTERN", "停顿形态"),
    ("CDLSTICKSANDWICH", "条形三明治"),
    ("CDLTAKURI", "探水竿"),
    ("CDLTASUKIGAP", "跳空并列阴阳线"),
    ("CDLTHRUSTING", "插入"),
    ("CDLTRISTAR", "三星"),
    ("CDLUNIQUE3RIVER", "奇特三河床"),
    ("CDLUPSIDEGAP2CROWS", "上升跳空两乌鸦"),
    ("CDLXSIDEGAP3METHODS", "上升/下降跳空三法"),
    // fundamentals and turnover
    ("PriceToBookRatio", "市净率"),
    ("MarketCap", "市值"),
    ("PERatio", "市盈率"),
    ("PriceToSalesRatio", "市销率"),
    ("ROE", "净资产收益率"),
    ("ROA", "总资产收益率"),
    ("ProfitMargins", "利润率"),
    ("QuickRatio", "速动比率"),
    ("DebtToEquity", "资产负债率"),
    ("TobinsQ", "托宾Q值"),
    ("DailyTurnover", "日换手率"),
    ("turnover_c1d", "1日累计换手率"),
    ("turnover_c5d", "5日累计换手率"),
    ("turnover_m5d", "5日移动换手率"),
    ("turnover_c10d", "10日累计换手率"),
    ("turnover_m10d", "10日移动换手率"),
    ("turnover_c20d", "20日累计换手率"),
    ("turnover_m20d", "20日移动换手率"),
    ("turnover_c30d", "30日累计换手率"),
    ("turnover_m30d", "30日移动换手率"),
    ("CurrentRatio", "流动比率"),
    // hilbert transform and adaptive averages
    ("HT_DCPERIOD", "希尔伯特变换主导周期"),
    ("HT_DCPHASE", "希尔伯特变换主导周期相位"),
    ("HT_INPHASE", "希尔伯特变换同相分量"),
    ("HT_QUADRATURE", "希尔伯特变换正交分量"),
    ("HT_SINE", "希尔伯特变换正弦波"),
    ("HT_LEADSINE", "希尔伯特变换领先正弦波"),
    ("HT_TRENDMODE", "希尔伯特变换趋势模式"),
    ("HT_TRENDLINE", "希尔伯特变换趋势线"),
    ("MAMA", "MESA自适应移动平均"),
    ("FAMA", "跟随自适应移动平均"),
    // price transforms and statistics
    ("AVGPRICE", "平均价格"),
    ("MEDPRICE", "中间价格"),
    ("TYPPRICE", "典型价格"),
    ("WCLPRICE", "加权收盘价"),
    ("MIDPOINT", "中点"),
    ("MIDPRICE", "中间价格"),
    ("LINEARREG", "线性回归"),
    ("LINEARREG_ANGLE", "线性回归角度"),
    ("LINEARREG_INTERCEPT", "线性回归截距"),
    ("LINEARREG_SLOPE", "线性回归斜率"),
    ("STDDEV", "标准差"),
    ("TSF", "时间序列预测"),
    ("VAR", "方差"),
    ("MAXINDEX", "最大值索引"),
    ("MININDEX", "最小值索引"),
    // alpha158 single-row features
    ("ALPHA158_KMID", "K线中点价格"),
    ("ALPHA158_KLEN", "K线长度"),
    ("ALPHA158_KMID2", "K线中点价格平方"),
    ("ALPHA158_KUP", "K线上影线"),
    ("ALPHA158_KUP2", "K线上影线平方"),
    ("ALPHA158_KLOW", "K线下影线"),
    ("ALPHA158_KLOW2", "K线下影线平方"),
    ("ALPHA158_KSFT", "K线偏移"),
    ("ALPHA158_KSFT2", "K线偏移平方"),
    ("ALPHA158_OPEN0", "当日开盘价"),
    ("ALPHA158_HIGH0", "当日最高价"),
    ("ALPHA158_LOW0", "当日最低价"),
    ("ALPHA158_VWAP0", "当日成交量加权平均价"),
    ("ALPHA158_VOLUME0", "当日成交量"),
];

/// Label suffixes of the windowed Alpha158 operators, keyed by operator name.
const ALPHA158_WINDOWED: &[(&str, &str)] = &[
    ("ROC", "收益率"),
    ("MA", "移动平均"),
    ("STD", "标准差"),
    ("BETA", "贝塔值"),
    ("RSQR", "R平方"),
    ("RESI", "线性回归残差"),
    ("MAX", "最大值"),
    ("MIN", "最小值"),
    ("QTLU", "上四分位数"),
    ("QTLD", "下四分位数"),
    ("RANK", "排名"),
    ("RSV", "RSV"),
    ("IMAX", "最高价位置指数"),
    ("IMIN", "最低价位置指数"),
    ("IMXD", "最高最低价位置差"),
    ("CORR", "相关性"),
    ("CORD", "相关性差分"),
    ("CNTP", "上涨天数比例"),
    ("CNTN", "下跌天数比例"),
    ("CNTD", "涨跌天数差"),
    ("SUMP", "总收益比例"),
    ("SUMN", "总损失比例"),
    ("SUMD", "收益损失差比例"),
    ("VMA", "成交量移动平均"),
    ("VSTD", "成交量标准差"),
    ("WVMA", "成交量加权价格波动率"),
    ("VSUMP", "成交量上升比例"),
    ("VSUMN", "成交量下降比例"),
    ("VSUMD", "成交量涨跌差比例"),
];

const ALPHA360_FIELDS: &[(&str, &str)] = &[
    ("CLOSE", "收盘价"),
    ("OPEN", "开盘价"),
    ("HIGH", "最高价"),
    ("LOW", "最低价"),
    ("VWAP", "成交量加权平均价"),
    ("VOLUME", "成交量"),
];

/// Localized label for `column`; unknown columns label themselves.
pub fn field_label(column: &str) -> String {
    if let Some((_, label)) = FIXED_LABELS.iter().find(|(c, _)| *c == column) {
        return label.to_string();
    }
    if let Some(rest) = column.strip_prefix("ALPHA360_")
        && let Some(label) = generated_label(rest, ALPHA360_FIELDS, |name, n| format!("Alpha360{}{}日前", name, n))
    {
        return label;
    }
    if let Some(rest) = column.strip_prefix("ALPHA158_")
        && let Some(label) = generated_label(rest, ALPHA158_WINDOWED, |name, n| format!("{}日{}", n, name))
    {
        return label;
    }
    column.to_string()
}

pub fn field_labels(columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| field_label(c)).collect()
}

/// Split `PREFIX<digits>` and look the prefix up in `table`.
fn generated_label(
    rest: &str,
    table: &[(&str, &str)],
    render: impl Fn(&str, u32) -> String,
) -> Option<String> {
    let digits_at = rest.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = rest.split_at(digits_at);
    let n: u32 = digits.parse().ok()?;
    table
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, name)| render(name, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_and_generated_labels() {
        assert_eq!(field_label("Date"), "日期");
        assert_eq!(field_label("RSI_14"), "14日相对强弱指数");
        assert_eq!(field_label("ALPHA360_CLOSE59"), "Alpha360收盘价59日前");
        assert_eq!(field_label("ALPHA360_VWAP0"), "Alpha360成交量加权平均价0日前");
        assert_eq!(field_label("ALPHA158_MA20"), "20日移动平均");
        assert_eq!(field_label("ALPHA158_VSUMD60"), "60日成交量涨跌差比例");
        assert_eq!(field_label("ALPHA158_KMID2"), "K线中点价格平方");
        assert_eq!(field_label("CDLKICKINGBYLENGTH"), "由较长缺影线决定的反冲形态");
        assert_eq!(field_label("turnover_m30d"), "30日移动换手率");
        assert_eq!(field_label("HT_TRENDMODE"), "希尔伯特变换趋势模式");
    }

    #[test]
    fn unknown_columns_label_themselves() {
        assert_eq!(field_label("Mystery"), "Mystery");
        assert_eq!(field_label("ALPHA158_NOPE5"), "ALPHA158_NOPE5");
        assert_eq!(field_label("ALPHA360_CLOSE"), "ALPHA360_CLOSE");
    }
}
